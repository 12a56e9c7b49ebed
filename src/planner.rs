//! Text planning: one style description per set and a list of unique
//! sticker specs.
//!
//! Only the initial sticker-list request may fail the run. Everything after
//! it (duplicates, short lists, malformed output) is compensated locally so
//! the caller always gets exactly the number of specs it asked for.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{TextBackend, with_retry};
use crate::config::{GenerationParams, RetryPolicy};
use crate::constants::{BACKFILL_DESCRIPTION_LABEL, BACKFILL_TEXT_PREFIX, DEFAULT_STYLE};
use crate::error::{PlanningError, RemoteError};
use crate::model::{StickerSpec, StyleDescription, TextPlacement, TextStyle, Theme};

/// Leading bullets and numbering on free-text list lines.
static LIST_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•·]+|\d+\s*[.)、:：]|[(（]\d+[)）])\s*").ok()
});

/// `"description": "..."` and `"text": "..."` pairs, found even when the
/// surrounding JSON was cut off.
static JSON_FIELD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#""(description|text)"\s*:\s*"((?:[^"\\]|\\.)*)""#).ok()
});

/// A line holding a bare `"key": value` fragment.
static JSON_FRAGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^"[^"]*"\s*:"#).ok());

/// Plans the style and sticker list for a theme.
#[derive(Debug)]
pub struct Planner<T> {
    backend: T,
    policy: RetryPolicy,
    params: GenerationParams,
}

impl<T: TextBackend> Planner<T> {
    /// Wraps a text backend.
    pub fn new(backend: T, policy: RetryPolicy, params: GenerationParams) -> Self {
        Self {
            backend,
            policy,
            params,
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &T {
        &self.backend
    }

    async fn ask(&self, label: &str, prompt: &str) -> Result<String, RemoteError> {
        with_retry(&self.policy, label, || {
            self.backend.generate_text(prompt, &self.params)
        })
        .await
    }

    /// Asks for the art direction of the set.
    ///
    /// Style is not critical: any remote failure yields [`default_style`].
    pub async fn plan_style(&self, theme: &Theme) -> StyleDescription {
        let prompt = style_prompt(theme);
        match self.ask("style", &prompt).await {
            Ok(reply) => parse_style(&reply).unwrap_or_else(|| {
                debug!("Style reply was empty, using default style");
                default_style()
            }),
            Err(err) => {
                warn!("Style request failed, using default style: {err}");
                default_style()
            }
        }
    }

    /// Produces exactly `count` specs with pairwise-distinct texts.
    ///
    /// Fails only when the first request fails outright.
    pub async fn plan_stickers(
        &self,
        theme: &Theme,
        style: &StyleDescription,
        count: usize,
    ) -> Result<Vec<StickerSpec>, PlanningError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let reply = self
            .ask("sticker list", &stickers_prompt(theme, style, count))
            .await?;
        let mut specs = dedupe_by_text(parse_candidates(&reply));
        specs.truncate(count);

        if specs.len() < count {
            let shortfall = count - specs.len();
            info!(
                "Planner returned {} unique stickers, asking for {shortfall} more",
                specs.len()
            );
            let used: Vec<&str> = specs.iter().map(|spec| spec.text.as_str()).collect();
            let prompt = supplement_prompt(theme, style, &used, shortfall);
            match self.ask("sticker supplement", &prompt).await {
                Ok(reply) => {
                    specs.extend(parse_candidates(&reply));
                    specs = dedupe_by_text(specs);
                    specs.truncate(count);
                }
                Err(err) => warn!("Supplementary sticker request failed: {err}"),
            }
        }

        if specs.len() < count {
            info!(
                "Backfilling {} stickers with generated placeholders",
                count - specs.len()
            );
            backfill(&mut specs, &theme.text, count);
        }

        ensure_unique_texts(&mut specs);
        Ok(specs)
    }
}

/// Style used when the remote model gives nothing usable.
pub fn default_style() -> StyleDescription {
    StyleDescription {
        summary: DEFAULT_STYLE.to_string(),
        text_style: TextStyle::default(),
    }
}

/// Specs that need no remote call, for offline previews.
pub fn placeholder_specs(theme: &str, count: usize) -> Vec<StickerSpec> {
    let mut specs = Vec::with_capacity(count);
    backfill(&mut specs, theme, count);
    specs
}

fn style_prompt(theme: &Theme) -> String {
    let character = theme
        .character
        .as_deref()
        .unwrap_or("an original cute mascot that fits the theme");
    format!(
        r##"You are the art director for a set of chat stickers.

Theme: {theme}
Character: {character}

Describe one consistent illustration style for the whole set in at most two sentences
(line weight, colour palette, shading, proportions), and how the short caption text
should look.

Return only a JSON object:
{{"style": "...", "text_color": "#RRGGBB", "outline_color": "#RRGGBB", "bold": true, "placement": "top|center|bottom"}}"##,
        theme = theme.text,
    )
}

fn stickers_prompt(theme: &Theme, style: &StyleDescription, count: usize) -> String {
    let character = theme.character.as_deref().unwrap_or("the set's mascot");
    format!(
        r#"Plan {count} chat stickers for the theme "{theme}".
Character: {character}
Style: {style}

Each sticker needs a short scene description (pose, expression, props) and a caption of
at most 6 characters, written in the theme's language. Every caption must be different.

Return only a JSON array of {count} objects: [{{"description": "...", "text": "..."}}]"#,
        theme = theme.text,
        style = style.summary,
    )
}

fn supplement_prompt(theme: &Theme, style: &StyleDescription, used: &[&str], count: usize) -> String {
    format!(
        r#"Plan exactly {count} more chat stickers for the theme "{theme}".
Style: {style}

These captions are already used and must not appear again: {used}

Return only a JSON array of {count} objects: [{{"description": "...", "text": "..."}}]"#,
        theme = theme.text,
        style = style.summary,
        used = serde_json::to_string(used).unwrap_or_default(),
    )
}

#[derive(Debug, Default, Deserialize)]
struct RawStyle {
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    text_color: Option<String>,
    #[serde(default)]
    outline_color: Option<String>,
    #[serde(default)]
    bold: Option<bool>,
    #[serde(default)]
    placement: Option<String>,
}

/// Reads a style reply. Non-JSON text is taken as the summary itself.
pub fn parse_style(reply: &str) -> Option<StyleDescription> {
    let raw = extract_json(reply, '{', '}')
        .and_then(|object| serde_json::from_str::<RawStyle>(object).ok());

    let Some(raw) = raw else {
        let summary = reply.trim();
        return (!summary.is_empty()).then(|| StyleDescription {
            summary: summary.to_string(),
            text_style: TextStyle::default(),
        });
    };

    let defaults = TextStyle::default();
    let placement = match raw.placement.as_deref().map(str::trim) {
        Some(p) if p.eq_ignore_ascii_case("top") => TextPlacement::Top,
        Some(p) if p.eq_ignore_ascii_case("center") || p.eq_ignore_ascii_case("middle") => {
            TextPlacement::Center
        }
        _ => TextPlacement::Bottom,
    };
    let summary = raw
        .style
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STYLE.to_string());

    Some(StyleDescription {
        summary,
        text_style: TextStyle {
            color: raw
                .text_color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or(defaults.color),
            outline: raw
                .outline_color
                .as_deref()
                .and_then(parse_hex_color)
                .unwrap_or(defaults.outline),
            bold: raw.bold.unwrap_or(defaults.bold),
            placement,
        },
    })
}

/// `#RRGGBB` or `RRGGBB`.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Returns the first balanced `open`..`close` span that parses as JSON.
///
/// Brackets inside string literals are ignored, so the model may wrap the
/// payload in prose or code fences.
pub fn extract_json(text: &str, open: char, close: char) -> Option<&str> {
    json_spans(text, open, close).next().map(|(span, _)| span)
}

/// Every balanced span that parses as JSON, in order of its opening bracket.
fn json_spans(text: &str, open: char, close: char) -> impl Iterator<Item = (&str, Value)> {
    text.match_indices(open).filter_map(move |(start, _)| {
        let end = balanced_end(&text[start..], open, close)?;
        let candidate = &text[start..start + end];
        serde_json::from_str::<Value>(candidate)
            .ok()
            .map(|value| (candidate, value))
    })
}

/// Byte length of the balanced span starting at `text[0] == open`.
fn balanced_end(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a sticker-list reply.
///
/// Takes the first JSON array that yields any sticker, so bracketed prose
/// such as footnotes is skipped. Without one, recovers description and text
/// fields from cut-off JSON, then falls back to one sticker per line.
pub fn parse_candidates(reply: &str) -> Vec<StickerSpec> {
    let structured = json_spans(reply, '[', ']').find_map(|(_, value)| {
        let specs: Vec<StickerSpec> = value
            .as_array()?
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| candidate_from_value(item, idx + 1))
            .collect();
        (!specs.is_empty()).then_some(specs)
    });
    if let Some(specs) = structured {
        return specs;
    }

    let recovered = recover_fields(reply);
    if !recovered.is_empty() {
        debug!("Recovered {} stickers from partial JSON", recovered.len());
        return recovered;
    }
    debug!("Sticker reply is not a JSON array, falling back to line parsing");
    parse_lines(reply)
}

/// Pairs up `description`/`text` fields in reply order. A field seen twice
/// before its partner starts the next sticker.
fn recover_fields(reply: &str) -> Vec<StickerSpec> {
    let Some(field) = (*JSON_FIELD).as_ref() else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    let mut item = serde_json::Map::new();
    for caps in field.captures_iter(reply) {
        let key = &caps[1];
        if item.contains_key(key) {
            push_recovered(&mut specs, std::mem::take(&mut item));
        }
        let raw = &caps[2];
        let value = serde_json::from_str::<String>(&format!("\"{raw}\""))
            .unwrap_or_else(|_| raw.to_string());
        item.insert(key.to_string(), Value::String(value));
    }
    push_recovered(&mut specs, item);
    specs
}

fn push_recovered(specs: &mut Vec<StickerSpec>, item: serde_json::Map<String, Value>) {
    if item.is_empty() {
        return;
    }
    if let Some(spec) = candidate_from_value(&Value::Object(item), specs.len() + 1) {
        specs.push(spec);
    }
}

fn candidate_from_value(item: &Value, position: usize) -> Option<StickerSpec> {
    let field = |key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let (description, text) = match item {
        Value::String(s) if !s.trim().is_empty() => (Some(s.trim()), None),
        Value::Object(_) => (field("description"), field("text")),
        _ => return None,
    };
    let text = text.map_or_else(|| placeholder_text(position), str::to_string);
    let description = description.map_or_else(|| text.clone(), str::to_string);
    Some(StickerSpec { description, text })
}

fn parse_lines(reply: &str) -> Vec<StickerSpec> {
    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .filter(|line| !matches!(line.chars().next(), Some('[' | ']' | '{' | '}')))
        .filter(|line| {
            !(*JSON_FRAGMENT)
                .as_ref()
                .is_some_and(|fragment| fragment.is_match(line))
        })
        .map(|line| match (*LIST_MARKER).as_ref() {
            Some(marker) => marker.replace(line, "").trim().to_string(),
            None => line.to_string(),
        })
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(idx, line)| match line.rsplit_once(['|', '｜']) {
            Some((description, text)) if !text.trim().is_empty() => {
                StickerSpec::new(description.trim(), text.trim())
            }
            _ => StickerSpec::new(line.as_str(), placeholder_text(idx + 1)),
        })
        .collect()
}

fn placeholder_text(k: usize) -> String {
    format!("{BACKFILL_TEXT_PREFIX}{k}")
}

/// Keeps the first spec for each exact text, dropping later duplicates.
pub fn dedupe_by_text(specs: Vec<StickerSpec>) -> Vec<StickerSpec> {
    let mut seen = HashSet::new();
    specs
        .into_iter()
        .filter(|spec| seen.insert(spec.text.clone()))
        .collect()
}

/// Appends generated specs until there are `count`, skipping any index whose
/// text is already taken.
pub fn backfill(specs: &mut Vec<StickerSpec>, theme: &str, count: usize) {
    let mut used: HashSet<String> = specs.iter().map(|spec| spec.text.clone()).collect();
    let mut k = 0usize;
    while specs.len() < count {
        k += 1;
        let text = placeholder_text(k);
        if used.contains(&text) {
            continue;
        }
        used.insert(text.clone());
        specs.push(StickerSpec::new(
            format!("{theme} - {BACKFILL_DESCRIPTION_LABEL} {k}"),
            text,
        ));
    }
}

/// Final guard: any repeated text gets a numeric suffix, incremented until
/// unique.
pub fn ensure_unique_texts(specs: &mut [StickerSpec]) {
    let mut seen: HashSet<String> = HashSet::with_capacity(specs.len());
    for spec in specs.iter_mut() {
        if seen.contains(&spec.text) {
            let mut suffix = 2usize;
            while seen.contains(&format!("{}{suffix}", spec.text)) {
                suffix += 1;
            }
            spec.text = format!("{}{suffix}", spec.text);
        }
        seen.insert(spec.text.clone());
    }
}
