mod container_test;
mod extension_test;
mod fixtures;
mod schema_model_test;
