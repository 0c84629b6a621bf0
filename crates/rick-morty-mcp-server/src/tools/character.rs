use std::fmt;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{GraphQLTool, convert_arguments, field};
use crate::errors::McpError;
use crate::graphql::{self, Data};
use crate::schema_from_type;

/// The name of the tool to look up a character
pub const GET_CHARACTER_TOOL_NAME: &str = "get_character";

const QUERY: &str = r#"query GetCharacter($id: ID!) {
  character(id: $id) {
    name
    status
    species
    type
    gender
    origin {
      name
    }
    location {
      name
    }
    image
  }
}"#;

#[derive(Clone)]
pub struct GetCharacter {
    pub tool: Tool,
    client: graphql::Client,
}

/// Input for the get_character tool.
#[derive(JsonSchema, Deserialize)]
pub struct Input {
    /// Character ID (1-826)
    pub character_id: i64,
}

impl GetCharacter {
    pub fn new(client: graphql::Client) -> Self {
        Self {
            client,
            tool: Tool::new(
                GET_CHARACTER_TOOL_NAME,
                "Get information about a Rick and Morty character by ID.",
                schema_from_type!(Input),
            ),
        }
    }

    pub async fn execute(&self, input: Input) -> Result<CallToolResult, McpError> {
        let mut variables = Map::new();
        variables.insert(
            "id".to_string(),
            Value::String(input.character_id.to_string()),
        );
        let data = self
            .client
            .execute(graphql::Request::new(QUERY).with_variables(variables))
            .await;

        Ok(CallToolResult::success(vec![Content::text(render(
            input.character_id,
            data,
        ))]))
    }
}

#[async_trait]
impl GraphQLTool for GetCharacter {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Option<JsonObject>) -> Result<CallToolResult, McpError> {
        self.execute(convert_arguments(arguments)?).await
    }
}

/// Flat view of the fields requested by the character query
#[derive(Debug, PartialEq)]
pub struct CharacterRecord<'a> {
    pub name: &'a str,
    pub status: &'a str,
    pub species: &'a str,
    pub kind: &'a str,
    pub gender: &'a str,
    pub origin: &'a str,
    pub location: &'a str,
    pub image: &'a str,
}

impl<'a> CharacterRecord<'a> {
    pub fn project(character: &'a Value) -> Self {
        let named = |key: &str| {
            character
                .get(key)
                .and_then(|place| field(place, "name"))
                .unwrap_or("Unknown")
        };
        Self {
            name: field(character, "name").unwrap_or("Unknown"),
            status: field(character, "status").unwrap_or("Unknown"),
            species: field(character, "species").unwrap_or("Unknown"),
            kind: field(character, "type").unwrap_or("N/A"),
            gender: field(character, "gender").unwrap_or("Unknown"),
            origin: named("origin"),
            location: named("location"),
            image: field(character, "image").unwrap_or("N/A"),
        }
    }
}

impl fmt::Display for CharacterRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Species: {}", self.species)?;
        writeln!(f, "Type: {}", self.kind)?;
        writeln!(f, "Gender: {}", self.gender)?;
        writeln!(f, "Origin: {}", self.origin)?;
        writeln!(f, "Location: {}", self.location)?;
        write!(f, "Image: {}", self.image)
    }
}

fn render(character_id: i64, data: Result<Option<Data>, graphql::Error>) -> String {
    let character = match data {
        Ok(Some(mut data)) => data.remove("character"),
        _ => None,
    };
    let Some(character) = character else {
        return "Unable to fetch character information.".to_string();
    };
    if character.is_null() {
        return format!("Character with ID {character_id} not found.");
    }
    CharacterRecord::project(&character).to_string()
}
