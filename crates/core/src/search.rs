//! Player search query parsing and matching.
//!
//! A query is split on whitespace and every token must match (AND). A token
//! is either a bare name fragment or a `key:value` field filter:
//!
//! | Value     | Meaning                     |
//! |-----------|-----------------------------|
//! | `abc`     | equals `abc`                |
//! | `abc*`    | starts with `abc`           |
//! | `*abc`    | ends with `abc`             |
//! | `*abc*`   | contains `abc`              |
//! | `*`       | has any value               |
//! | `!`       | has no value                |
//!
//! A leading `!` on the token (`!world:Gaia`) or on the value (`world:!Gaia`)
//! negates it. All comparisons are case-insensitive.

use std::str::FromStr;

use crate::error::CoreError;
use crate::player::{gender_name, race_name, Player};
use crate::worlds::WorldRegistry;

// ---------------------------------------------------------------------------
// Name matching mode
// ---------------------------------------------------------------------------

/// How bare tokens are matched against the player name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatchMode {
    #[default]
    Contains,
    StartsWith,
    Exact,
}

impl FromStr for NameMatchMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "exact" => Ok(Self::Exact),
            other => Err(CoreError::Validation(format!(
                "Invalid name search mode '{other}'. Must be one of: contains, starts_with, exact"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Fields and value patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    FreeCompany,
    Tags,
    Notes,
    Race,
    Gender,
    World,
    DataCenter,
}

impl SearchField {
    fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "fc" | "freecompany" | "free_company" => Some(Self::FreeCompany),
            "tag" | "tags" => Some(Self::Tags),
            "note" | "notes" => Some(Self::Notes),
            "race" => Some(Self::Race),
            "gender" => Some(Self::Gender),
            "world" => Some(Self::World),
            "dc" | "datacenter" | "data_center" => Some(Self::DataCenter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuePattern {
    Any,
    Empty,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl ValuePattern {
    fn parse(raw: &str) -> Self {
        let value = raw.to_lowercase();
        if value == "!" {
            return Self::Empty;
        }
        let starts = value.starts_with('*');
        let ends = value.len() > 1 && value.ends_with('*');
        let inner = value.trim_matches('*');
        if inner.is_empty() {
            return Self::Any;
        }
        match (starts, ends) {
            (true, true) => Self::Contains(inner.to_string()),
            (true, false) => Self::Suffix(inner.to_string()),
            (false, true) => Self::Prefix(inner.to_string()),
            (false, false) => Self::Exact(inner.to_string()),
        }
    }

    /// Match against every value the field holds. Multi-valued fields match
    /// when any value does; `Empty` matches only when there are none.
    fn matches(&self, values: &[String]) -> bool {
        let present: Vec<String> = values
            .iter()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.to_lowercase())
            .collect();
        match self {
            Self::Empty => present.is_empty(),
            Self::Any => !present.is_empty(),
            Self::Exact(s) => present.iter().any(|v| v == s),
            Self::Prefix(s) => present.iter().any(|v| v.starts_with(s.as_str())),
            Self::Suffix(s) => present.iter().any(|v| v.ends_with(s.as_str())),
            Self::Contains(s) => present.iter().any(|v| v.contains(s.as_str())),
        }
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    Name {
        needle: String,
        negate: bool,
    },
    Field {
        field: SearchField,
        pattern: ValuePattern,
        negate: bool,
    },
}

/// Reference data needed to evaluate field filters.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub worlds: &'a WorldRegistry,
    pub name_mode: NameMatchMode,
}

/// A parsed search query. The empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<SearchTerm>,
}

impl SearchQuery {
    pub fn parse(query: &str) -> Self {
        Self {
            terms: query.split_whitespace().filter_map(parse_token).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    pub fn matches(&self, player: &Player, ctx: &SearchContext<'_>) -> bool {
        self.terms.iter().all(|term| term_matches(term, player, ctx))
    }
}

fn parse_token(token: &str) -> Option<SearchTerm> {
    let (mut negate, body) = match token.strip_prefix('!') {
        Some(rest) if !rest.is_empty() => (true, rest),
        _ => (false, token),
    };

    if let Some((key, value)) = body.split_once(':') {
        if let Some(field) = SearchField::from_key(key) {
            let value = match value.strip_prefix('!') {
                Some(rest) if !rest.is_empty() => {
                    negate = !negate;
                    rest
                }
                _ => value,
            };
            return Some(SearchTerm::Field {
                field,
                pattern: ValuePattern::parse(value),
                negate,
            });
        }
    }

    let needle = body.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    Some(SearchTerm::Name { needle, negate })
}

fn term_matches(term: &SearchTerm, player: &Player, ctx: &SearchContext<'_>) -> bool {
    match term {
        SearchTerm::Name { needle, negate } => {
            let name = player.name.to_lowercase();
            let hit = match ctx.name_mode {
                NameMatchMode::Contains => name.contains(needle.as_str()),
                NameMatchMode::StartsWith => name.starts_with(needle.as_str()),
                NameMatchMode::Exact => name == *needle,
            };
            hit != *negate
        }
        SearchTerm::Field {
            field,
            pattern,
            negate,
        } => pattern.matches(&field_values(*field, player, ctx)) != *negate,
    }
}

fn field_values(field: SearchField, player: &Player, ctx: &SearchContext<'_>) -> Vec<String> {
    let single = |v: Option<&str>| v.map(|s| vec![s.to_string()]).unwrap_or_default();
    match field {
        SearchField::FreeCompany => single(player.free_company.as_deref()),
        SearchField::Tags => player.assigned_tags.iter().map(|t| t.name.clone()).collect(),
        SearchField::Notes => single(Some(player.notes.as_str())),
        SearchField::Race => single(player.race().and_then(race_name)),
        SearchField::Gender => single(player.gender().and_then(gender_name)),
        SearchField::World => single(ctx.worlds.world_name(player.world_id)),
        SearchField::DataCenter => single(ctx.worlds.data_center(player.world_id)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Tag;
    use crate::worlds::World;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn worlds() -> WorldRegistry {
        WorldRegistry::new([
            World::new(63, "Gilgamesh", "Aether"),
            World::new(64, "Gaia", "Mana"),
        ])
    }

    fn player(name: &str, world: u32, tags: &[&str]) -> Player {
        let mut p = Player::new(name, world, Utc::now());
        for (i, t) in tags.iter().enumerate() {
            p.assign_tag(Tag::new(i as i64 + 1, *t));
        }
        p
    }

    fn matches(query: &str, p: &Player) -> bool {
        let worlds = worlds();
        let ctx = SearchContext {
            worlds: &worlds,
            name_mode: NameMatchMode::Contains,
        };
        SearchQuery::parse(query).matches(p, &ctx)
    }

    // -- Parsing -------------------------------------------------------------

    #[test]
    fn parses_field_and_negation() {
        let q = SearchQuery::parse("tags:vip !world:Gaia");
        assert_eq!(q.terms().len(), 2);
        assert_matches!(
            &q.terms()[1],
            SearchTerm::Field { field: SearchField::World, pattern: ValuePattern::Exact(v), negate: true } if v == "gaia"
        );
    }

    #[test]
    fn value_negation_and_double_negation() {
        let q = SearchQuery::parse("world:!Gaia !world:!Gaia");
        assert_matches!(&q.terms()[0], SearchTerm::Field { negate: true, .. });
        assert_matches!(&q.terms()[1], SearchTerm::Field { negate: false, .. });
    }

    #[test]
    fn wildcard_patterns() {
        assert_eq!(ValuePattern::parse("*"), ValuePattern::Any);
        assert_eq!(ValuePattern::parse("!"), ValuePattern::Empty);
        assert_eq!(ValuePattern::parse("ab*"), ValuePattern::Prefix("ab".into()));
        assert_eq!(ValuePattern::parse("*ab"), ValuePattern::Suffix("ab".into()));
        assert_eq!(ValuePattern::parse("*ab*"), ValuePattern::Contains("ab".into()));
        assert_eq!(ValuePattern::parse("AB"), ValuePattern::Exact("ab".into()));
    }

    #[test]
    fn unknown_key_is_a_name_term() {
        let q = SearchQuery::parse("foo:bar");
        assert_matches!(&q.terms()[0], SearchTerm::Name { needle, negate: false } if needle == "foo:bar");
    }

    #[test]
    fn empty_query_matches_all() {
        let q = SearchQuery::parse("   ");
        assert!(q.is_empty());
        assert!(matches("", &player("Foo Bar", 63, &[])));
    }

    // -- Matching ------------------------------------------------------------

    #[test]
    fn tag_and_negated_world_compose() {
        let vip_gilgamesh = player("Foo Bar", 63, &["vip"]);
        let vip_gaia = player("Foo Baz", 64, &["vip"]);
        let plain = player("Foo Qux", 63, &["raid"]);

        assert!(matches("tags:vip !world:Gaia", &vip_gilgamesh));
        assert!(!matches("tags:vip !world:Gaia", &vip_gaia));
        assert!(!matches("tags:vip !world:Gaia", &plain));
    }

    #[test]
    fn tag_wildcards() {
        let p = player("Foo Bar", 63, &["very important"]);
        assert!(matches("tags:very*", &p));
        assert!(matches("tags:*important", &p));
        assert!(matches("tags:*import*", &p));
        assert!(!matches("tags:vip", &p));
        assert!(matches("tags:*", &p));
        assert!(!matches("tags:!", &p));
        assert!(matches("tags:!", &player("Foo Bar", 63, &[])));
    }

    #[test]
    fn notes_and_free_company_empty_sentinel() {
        let mut p = player("Foo Bar", 63, &[]);
        assert!(matches("notes:!", &p));
        assert!(matches("fc:!", &p));
        p.notes = "met in a raid".into();
        p.free_company = Some("Moogle Mob".into());
        assert!(matches("notes:*raid*", &p));
        assert!(matches("fc:moogle*", &p));
        assert!(matches("!notes:!", &p));
    }

    #[test]
    fn data_center_and_race() {
        let mut p = player("Foo Bar", 64, &[]);
        p.customize = Some(vec![6, 0]);
        assert!(matches("dc:mana", &p));
        assert!(matches("race:au*", &p));
        assert!(matches("gender:male", &p));
        assert!(!matches("dc:aether", &p));
    }

    #[test]
    fn name_modes() {
        let worlds = worlds();
        let p = player("Foo Bar", 63, &[]);
        let q = SearchQuery::parse("bar");
        let mut ctx = SearchContext {
            worlds: &worlds,
            name_mode: NameMatchMode::Contains,
        };
        assert!(q.matches(&p, &ctx));
        ctx.name_mode = NameMatchMode::StartsWith;
        assert!(!q.matches(&p, &ctx));
        ctx.name_mode = NameMatchMode::Exact;
        assert!(!SearchQuery::parse("foo").matches(&p, &ctx));
        assert!(!matches("!foo", &p));
    }
}
