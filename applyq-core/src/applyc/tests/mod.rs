mod expand_tests;
mod pipeline_tests;
