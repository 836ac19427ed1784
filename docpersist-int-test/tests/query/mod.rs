mod query_builder_test;
mod sort_param_test;
