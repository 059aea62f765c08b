//! Fixed table of tracked endpoints.

use once_cell::sync::Lazy;
use regex::Regex;

use post_tracker_core_types::{Classification, Direction};

/// What a tracked call does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndpointMatch {
    /// Creates a post or reply; the kind is decided from the request body.
    CreateContent,
    /// Like/unlike/repost/un-repost of an existing item.
    Secondary {
        kind: Classification,
        direction: Direction,
    },
}

struct EndpointRule {
    pattern: Regex,
    matched: EndpointMatch,
}

pub struct EndpointTable {
    rules: Vec<EndpointRule>,
}

const HOST: &str = r"https://(?:[^/]+\.)?x\.com/i/api";

fn graphql(operations: &str) -> String {
    format!(r"{HOST}/graphql/[^/?]+/(?:{operations})(?:[/?]|$)")
}

fn rest(path: &str) -> String {
    format!(r"{HOST}/1\.1/{path}")
}

static STANDARD: Lazy<EndpointTable> = Lazy::new(|| {
    let secondary = |kind, direction| EndpointMatch::Secondary { kind, direction };
    EndpointTable::from_patterns(&[
        (graphql("CreateTweet"), EndpointMatch::CreateContent),
        (rest(r"statuses/update\.json"), EndpointMatch::CreateContent),
        (
            graphql("FavoriteTweet|CreateFavorite"),
            secondary(Classification::Like, Direction::Create),
        ),
        (
            rest(r"favorites/create\.json"),
            secondary(Classification::Like, Direction::Create),
        ),
        (
            graphql("UnfavoriteTweet|DeleteFavorite"),
            secondary(Classification::Like, Direction::Delete),
        ),
        (
            rest(r"favorites/destroy\.json"),
            secondary(Classification::Like, Direction::Delete),
        ),
        (
            graphql("CreateRetweet|CreateRetweetWithComments"),
            secondary(Classification::Repost, Direction::Create),
        ),
        (
            rest("statuses/retweet/"),
            secondary(Classification::Repost, Direction::Create),
        ),
        (
            graphql("DeleteRetweet|UnretweetTweet"),
            secondary(Classification::Repost, Direction::Delete),
        ),
        (
            rest("statuses/unretweet/"),
            secondary(Classification::Repost, Direction::Delete),
        ),
    ])
});

impl EndpointTable {
    /// Table of the platform endpoints the tracker understands.
    pub fn standard() -> &'static EndpointTable {
        &STANDARD
    }

    fn from_patterns(patterns: &[(String, EndpointMatch)]) -> Self {
        let rules = patterns
            .iter()
            .map(|(pattern, matched)| EndpointRule {
                pattern: Regex::new(pattern).expect("endpoint pattern compiles"),
                matched: *matched,
            })
            .collect();
        Self { rules }
    }

    /// Only POST calls are ever tracked.
    pub fn detect(&self, method: &str, url: &str) -> Option<EndpointMatch> {
        if url.is_empty() || !method.eq_ignore_ascii_case("POST") {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(url))
            .map(|rule| rule.matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(method: &str, url: &str) -> Option<EndpointMatch> {
        EndpointTable::standard().detect(method, url)
    }

    #[test]
    fn create_tweet_variants() {
        assert_eq!(
            detect("POST", "https://x.com/i/api/graphql/abc123/CreateTweet"),
            Some(EndpointMatch::CreateContent)
        );
        assert_eq!(
            detect("post", "https://api.x.com/i/api/1.1/statuses/update.json"),
            Some(EndpointMatch::CreateContent)
        );
    }

    #[test]
    fn like_and_unlike_are_distinct() {
        assert_eq!(
            detect("POST", "https://x.com/i/api/graphql/q1/FavoriteTweet"),
            Some(EndpointMatch::Secondary {
                kind: Classification::Like,
                direction: Direction::Create
            })
        );
        assert_eq!(
            detect("POST", "https://x.com/i/api/graphql/q1/UnfavoriteTweet"),
            Some(EndpointMatch::Secondary {
                kind: Classification::Like,
                direction: Direction::Delete
            })
        );
    }

    #[test]
    fn retweet_and_unretweet_rest_paths() {
        assert_eq!(
            detect("POST", "https://x.com/i/api/1.1/statuses/retweet/55.json"),
            Some(EndpointMatch::Secondary {
                kind: Classification::Repost,
                direction: Direction::Create
            })
        );
        assert_eq!(
            detect("POST", "https://x.com/i/api/1.1/statuses/unretweet/55.json"),
            Some(EndpointMatch::Secondary {
                kind: Classification::Repost,
                direction: Direction::Delete
            })
        );
    }

    #[test]
    fn ignores_other_methods_and_hosts() {
        assert_eq!(detect("GET", "https://x.com/i/api/graphql/abc/CreateTweet"), None);
        assert_eq!(
            detect("POST", "https://example.com/i/api/graphql/abc/CreateTweet"),
            None
        );
        assert_eq!(detect("POST", "https://x.com/i/api/graphql/abc/CreateTweetDraft"), None);
        assert_eq!(detect("POST", ""), None);
    }
}
