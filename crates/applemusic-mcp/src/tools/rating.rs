use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use applemusic_core::service::{Backend, RatingAction};
use applemusic_core::MusicService;

use super::{
    ToolHandler, format, json_schema, merge_properties, required_str, selector_properties,
    single_selector, u64_arg,
};

pub struct RatingTool {
    service: Arc<MusicService>,
}

impl RatingTool {
    pub fn new(service: Arc<MusicService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ToolHandler for RatingTool {
    fn name(&self) -> &str {
        "rating"
    }

    fn description(&self) -> &str {
        "Love or dislike a track, or get/set its 0-5 star rating. Star ratings \
         need Music.app (macOS); love/dislike fall back to the Apple Music API."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            merge_properties(
                serde_json::json!({
                    "action": {
                        "type": "string",
                        "enum": ["love", "dislike", "get", "set"],
                        "description": "What to do"
                    },
                    "stars": {
                        "type": "number",
                        "description": "0-5 stars, for set"
                    }
                }),
                selector_properties(),
            ),
            vec!["action"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let action = required_str(&input, "action")?;
        let stars = match u64_arg(&input, "stars") {
            Some(s) => Some(u8::try_from(s).map_err(|_| anyhow!("stars must be between 0 and 5"))?),
            None => None,
        };
        let action = RatingAction::parse(action, stars)?;
        let selector = single_selector(&input)?;
        let outcome = self.service.rate(&selector, action).await?;
        let track = outcome.track.display();
        Ok(match (action, outcome.stars) {
            (RatingAction::Preference(p), _) => {
                let via = match outcome.backend {
                    Backend::Local => "Music.app",
                    Backend::Remote => "Apple Music",
                };
                format!("Marked {track} as {p} in {via}")
            }
            (RatingAction::Get, Some(s)) => format!("{track}: {} ({}/100)", format::stars(s), s as u32 * 20),
            (RatingAction::Set(_), Some(s)) => format!("Set {track} to {}", format::stars(s)),
            (_, None) => format!("Rated {track}"),
        })
    }
}
