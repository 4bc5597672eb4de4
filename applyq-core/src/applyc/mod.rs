// Copyright 2025 HelixDB Inc.
// SPDX-License-Identifier: AGPL-3.0

//! The apply compiler: AST, schema model, pre-binding analysis and binding.

pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod extensions;
pub mod schema;
pub mod settings;

#[cfg(test)]
mod tests;
