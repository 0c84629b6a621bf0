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

/// The name of the tool to look up an episode
pub const GET_EPISODE_TOOL_NAME: &str = "get_episode";

/// Only this many character names are listed for an episode
const MAX_CHARACTERS: usize = 10;

const QUERY: &str = r#"query GetEpisode($id: ID!) {
  episode(id: $id) {
    name
    air_date
    episode
    characters {
      name
    }
  }
}"#;

#[derive(Clone)]
pub struct GetEpisode {
    pub tool: Tool,
    client: graphql::Client,
}

/// Input for the get_episode tool.
#[derive(JsonSchema, Deserialize)]
pub struct Input {
    /// Episode ID (1-51)
    pub episode_id: i64,
}

impl GetEpisode {
    pub fn new(client: graphql::Client) -> Self {
        Self {
            client,
            tool: Tool::new(
                GET_EPISODE_TOOL_NAME,
                "Get information about a Rick and Morty episode by ID.",
                schema_from_type!(Input),
            ),
        }
    }

    pub async fn execute(&self, input: Input) -> Result<CallToolResult, McpError> {
        let mut variables = Map::new();
        variables.insert(
            "id".to_string(),
            Value::String(input.episode_id.to_string()),
        );
        let data = self
            .client
            .execute(graphql::Request::new(QUERY).with_variables(variables))
            .await;

        Ok(CallToolResult::success(vec![Content::text(render(
            input.episode_id,
            data,
        ))]))
    }
}

#[async_trait]
impl GraphQLTool for GetEpisode {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Option<JsonObject>) -> Result<CallToolResult, McpError> {
        self.execute(convert_arguments(arguments)?).await
    }
}

/// Flat view of the fields requested by the episode query
#[derive(Debug, PartialEq)]
pub struct EpisodeRecord<'a> {
    pub name: &'a str,
    pub air_date: &'a str,
    pub code: &'a str,
    /// At most the first ten names, in API order
    pub characters: Vec<&'a str>,
}

impl<'a> EpisodeRecord<'a> {
    pub fn project(episode: &'a Value) -> Self {
        Self {
            name: field(episode, "name").unwrap_or("Unknown"),
            air_date: field(episode, "air_date").unwrap_or("Unknown"),
            code: field(episode, "episode").unwrap_or("Unknown"),
            characters: episode
                .get("characters")
                .and_then(Value::as_array)
                .map(|characters| {
                    characters
                        .iter()
                        .take(MAX_CHARACTERS)
                        .filter_map(|character| field(character, "name"))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for EpisodeRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Episode: {}", self.name)?;
        writeln!(f, "Air Date: {}", self.air_date)?;
        writeln!(f, "Episode Code: {}", self.code)?;
        if self.characters.is_empty() {
            write!(f, "Characters: N/A")
        } else {
            write!(f, "Characters: {}", self.characters.join(", "))
        }
    }
}

fn render(episode_id: i64, data: Result<Option<Data>, graphql::Error>) -> String {
    let episode = match data {
        Ok(Some(mut data)) => data.remove("episode"),
        _ => None,
    };
    let Some(episode) = episode else {
        return "Unable to fetch episode information.".to_string();
    };
    if episode.is_null() {
        return format!("Episode with ID {episode_id} not found.");
    }
    EpisodeRecord::project(&episode).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::result_text;
    use insta::assert_snapshot;
    use serde_json::json;
    use url::Url;

    fn data(value: Value) -> Result<Option<Data>, graphql::Error> {
        Ok(value.as_object().cloned())
    }

    fn characters(count: usize) -> Value {
        Value::Array(
            (1..=count)
                .map(|n| json!({ "name": format!("Character {n}") }))
                .collect(),
        )
    }

    #[test]
    fn renders_pilot() {
        let text = render(
            1,
            data(json!({
                "episode": {
                    "name": "Pilot",
                    "air_date": "December 2, 2013",
                    "episode": "S01E01",
                    "characters": [
                        { "name": "Rick Sanchez" },
                        { "name": "Morty Smith" },
                        { "name": "Bepisian" }
                    ]
                }
            })),
        );

        assert_snapshot!(text, @r"
        Episode: Pilot
        Air Date: December 2, 2013
        Episode Code: S01E01
        Characters: Rick Sanchez, Morty Smith, Bepisian
        ");
    }

    #[test]
    fn lists_only_the_first_ten_characters() {
        let episode = json!({
            "name": "Close Rick-counters of the Rick Kind",
            "characters": characters(19)
        });

        let record = EpisodeRecord::project(&episode);

        assert_eq!(record.characters.len(), 10);
        assert!(record.to_string().ends_with(
            "Characters: Character 1, Character 2, Character 3, Character 4, Character 5, \
             Character 6, Character 7, Character 8, Character 9, Character 10"
        ));
    }

    #[test]
    fn exactly_ten_characters_are_all_listed() {
        let episode = json!({ "characters": characters(10) });

        assert_eq!(EpisodeRecord::project(&episode).characters.len(), 10);
    }

    #[test]
    fn empty_or_missing_characters_render_na() {
        for episode in [
            json!({ "characters": [] }),
            json!({}),
            json!({ "characters": null }),
        ] {
            let text = EpisodeRecord::project(&episode).to_string();

            assert_eq!(
                text,
                "Episode: Unknown\nAir Date: Unknown\nEpisode Code: Unknown\nCharacters: N/A"
            );
        }
    }

    #[test]
    fn null_episode_is_not_found() {
        assert_eq!(
            render(52, data(json!({ "episode": null }))),
            "Episode with ID 52 not found."
        );
    }

    #[test]
    fn failures_and_missing_key_are_unable_to_fetch() {
        for result in [
            Err(graphql::Error::GraphQL("Unknown error".to_string())),
            Ok(None),
            data(json!({ "character": null })),
        ] {
            assert_eq!(render(1, result), "Unable to fetch episode information.");
        }
    }

    #[tokio::test]
    async fn fetches_episode_by_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(mockito::Matcher::PartialJson(
                json!({ "variables": { "id": "1" } }),
            ))
            .with_status(200)
            .with_body(
                json!({
                    "data": {
                        "episode": {
                            "name": "Pilot",
                            "air_date": "December 2, 2013",
                            "episode": "S01E01",
                            "characters": [{ "name": "Rick Sanchez" }]
                        }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let client =
            graphql::Client::new(Url::parse(&server.url()).unwrap(), Default::default()).unwrap();

        let result = GetEpisode::new(client)
            .execute(Input { episode_id: 1 })
            .await
            .unwrap();

        mock.assert_async().await;
        let text = result_text(&result);
        assert!(text.contains("Episode: Pilot"));
        assert!(text.contains("Episode Code: S01E01"));
    }

    #[tokio::test]
    async fn graphql_errors_render_unable_to_fetch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"data":{"episode":{"name":"Pilot"}},"errors":[{"message":"nope"}]}"#)
            .create_async()
            .await;
        let client =
            graphql::Client::new(Url::parse(&server.url()).unwrap(), Default::default()).unwrap();

        let result = GetEpisode::new(client)
            .execute(Input { episode_id: 1 })
            .await
            .unwrap();

        assert_eq!(result_text(&result), "Unable to fetch episode information.");
    }
}
