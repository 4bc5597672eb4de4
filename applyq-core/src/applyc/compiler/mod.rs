// Copyright 2025 HelixDB Inc.
// SPDX-License-Identifier: AGPL-3.0

//! Binds an apply pipeline to a queryable source.
//! The pipeline orchestrator lives in `pipeline`; each stage kind has its own file
//! adding methods to [`pipeline::Pipeline`]. Scalar expressions go through
//! [`binder::ExpressionCompiler`], which resolves member paths against the
//! working row shapes kept in [`shape::ShapeArena`].

pub mod aggregation;
pub mod binder;
pub mod compute;
pub mod expand;
pub mod options;
pub mod pipeline;
pub mod shape;

pub use binder::ExpressionCompiler;
pub use options::{OrderByItem, QueryOptions, apply_query_options};
pub use pipeline::{ApplyBinder, BoundQuery, Pipeline};
pub use shape::{FieldDecl, RowShape, ShapeArena, ShapeId};
