/// The JSON Schema of a type as an MCP tool input schema
#[macro_export]
macro_rules! schema_from_type {
    ($type:ty) => {{
        schemars::schema_for!($type)
            .as_object()
            .cloned()
            .unwrap_or_default()
    }};
}
