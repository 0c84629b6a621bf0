pub mod errors;
pub mod graphql;
pub mod json_schema;
pub mod server;
pub mod server_handler;
pub mod tools;
