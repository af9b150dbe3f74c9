pub mod response_spec;
