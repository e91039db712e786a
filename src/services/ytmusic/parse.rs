use serde_json::Value;

use crate::ports::playlist::PlaylistTrack;

/// Token for the next batch of playlist items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// `continuationItemRenderer` token, sent in the request body
    Command(String),
    /// `nextContinuationData` token, sent as `ctoken` query parameters
    Legacy(String),
}

impl Continuation {
    pub fn token(&self) -> &str {
        match self {
            Continuation::Command(token) | Continuation::Legacy(token) => token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistPage {
    pub tracks: Vec<PlaylistTrack>,
    pub continuation: Option<Continuation>,
}

/// Depth-first search for the first value stored under `key`.
fn find_key<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let mut stack = vec![root];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    return Some(found);
                }
                stack.extend(map.values());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    None
}

/// Text of the first run of flex column `column`.
fn flex_column_text(renderer: &Value, column: usize) -> String {
    renderer["flexColumns"][column]["musicResponsiveListItemFlexColumnRenderer"]["text"]["runs"]
        [0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn track_from_renderer(renderer: &Value) -> Option<PlaylistTrack> {
    let title = flex_column_text(renderer, 0);
    if title.is_empty() {
        return None;
    }
    Some(PlaylistTrack::new(flex_column_text(renderer, 1), title))
}

/// Extract playlist items and the continuation token from a browse response.
///
/// Handles the initial playlist page (`musicPlaylistShelfRenderer`), legacy
/// continuation pages (`musicPlaylistShelfContinuation`) and current
/// continuation pages (`appendContinuationItemsAction`). Returns `None` when
/// the response carries none of them.
pub fn parse_playlist_page(response: &Value) -> Option<PlaylistPage> {
    let shelf = find_key(response, "musicPlaylistShelfRenderer")
        .or_else(|| find_key(response, "musicPlaylistShelfContinuation"));

    let (items, legacy) = match shelf {
        Some(shelf) => (
            shelf["contents"].as_array()?,
            shelf["continuations"][0]["nextContinuationData"]["continuation"].as_str(),
        ),
        None => (find_key(response, "continuationItems")?.as_array()?, None),
    };

    let mut tracks = Vec::new();
    let mut continuation = legacy.map(|token| Continuation::Legacy(token.to_string()));

    for item in items {
        if let Some(renderer) = item.get("musicResponsiveListItemRenderer") {
            tracks.extend(track_from_renderer(renderer));
        } else if let Some(token) = item["continuationItemRenderer"]["continuationEndpoint"]
            ["continuationCommand"]["token"]
            .as_str()
        {
            continuation = Some(Continuation::Command(token.to_string()));
        }
    }

    Some(PlaylistPage {
        tracks,
        continuation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(title: &str, artist: &str) -> Value {
        json!({
            "musicResponsiveListItemRenderer": {
                "flexColumns": [
                    {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": title}]}}},
                    {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [
                        {"text": artist}, {"text": " & "}, {"text": "Someone Else"}
                    ]}}},
                    {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": "Album"}]}}}
                ]
            }
        })
    }

    #[test]
    fn test_initial_page_with_command_continuation() {
        let response = json!({
            "contents": {"twoColumnBrowseResultsRenderer": {"secondaryContents": {"sectionListRenderer": {
                "contents": [{"musicPlaylistShelfRenderer": {"contents": [
                    item("Song One", "The Band"),
                    item("Song Two", "Other Band"),
                    {"continuationItemRenderer": {"continuationEndpoint": {"continuationCommand": {"token": "NEXT"}}}}
                ]}}]
            }}}}
        });

        let page = parse_playlist_page(&response).unwrap();

        assert_eq!(
            page.tracks,
            vec![
                PlaylistTrack::new("The Band", "Song One"),
                PlaylistTrack::new("Other Band", "Song Two"),
            ]
        );
        assert_eq!(page.continuation, Some(Continuation::Command("NEXT".into())));
    }

    #[test]
    fn test_append_continuation_page() {
        let response = json!({
            "onResponseReceivedActions": [{"appendContinuationItemsAction": {"continuationItems": [
                item("Song Three", "Band")
            ]}}]
        });

        let page = parse_playlist_page(&response).unwrap();

        assert_eq!(page.tracks, vec![PlaylistTrack::new("Band", "Song Three")]);
        assert_eq!(page.continuation, None);
    }

    #[test]
    fn test_legacy_continuation_page() {
        let response = json!({
            "continuationContents": {"musicPlaylistShelfContinuation": {
                "contents": [item("Song Four", "Band")],
                "continuations": [{"nextContinuationData": {"continuation": "CTOKEN"}}]
            }}
        });

        let page = parse_playlist_page(&response).unwrap();

        assert_eq!(page.tracks.len(), 1);
        assert_eq!(page.continuation, Some(Continuation::Legacy("CTOKEN".into())));
    }

    #[test]
    fn test_items_without_title_or_artist() {
        let response = json!({"musicPlaylistShelfRenderer": {"contents": [
            {"musicResponsiveListItemRenderer": {"flexColumns": []}},
            {"musicResponsiveListItemRenderer": {"flexColumns": [
                {"musicResponsiveListItemFlexColumnRenderer": {"text": {"runs": [{"text": "Lonely Title"}]}}}
            ]}}
        ]}});

        let page = parse_playlist_page(&response).unwrap();

        assert_eq!(page.tracks, vec![PlaylistTrack::new("", "Lonely Title")]);
    }

    #[test]
    fn test_unrelated_response() {
        assert_eq!(parse_playlist_page(&json!({"alerts": []})), None);
    }
}
