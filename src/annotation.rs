// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

//! Typed annotation fields and their textual encodings in the annotation file.
//!
//! List and tuple fields are stored as literal text (`[1, 3]`,
//! `('00:01:00','00:05:30')`). Every field has a parser and a serializer here;
//! the store falls back to the field default when a parser fails.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

/// Length of the tail preview window. The outro fields on the form are
/// entered relative to the start of this window.
pub const TAIL_WINDOW_SECONDS: u64 = 600;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid list literal: {0}")]
    InvalidList(String),
    #[error("unknown code: {0}")]
    UnknownCode(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid timestamp pair: {0}")]
    InvalidPair(String),
    #[error("invalid flag: {0}")]
    InvalidFlag(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Floating,
}

impl WatermarkPosition {
    pub const ALL: [WatermarkPosition; 5] = [
        WatermarkPosition::TopLeft,
        WatermarkPosition::TopRight,
        WatermarkPosition::BottomLeft,
        WatermarkPosition::BottomRight,
        WatermarkPosition::Floating,
    ];

    pub fn code(self) -> u8 {
        match self {
            WatermarkPosition::TopLeft => 0,
            WatermarkPosition::TopRight => 1,
            WatermarkPosition::BottomLeft => 2,
            WatermarkPosition::BottomRight => 3,
            WatermarkPosition::Floating => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            WatermarkPosition::TopLeft => "Top left",
            WatermarkPosition::TopRight => "Top right",
            WatermarkPosition::BottomLeft => "Bottom left",
            WatermarkPosition::BottomRight => "Bottom right",
            WatermarkPosition::Floating => "Other / floating",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Series,
    Movie,
    Documentary,
    Animation,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Series,
        Category::Movie,
        Category::Documentary,
        Category::Animation,
        Category::Other,
    ];

    pub fn code(self) -> u8 {
        match self {
            Category::Series => 0,
            Category::Movie => 1,
            Category::Documentary => 2,
            Category::Animation => 3,
            Category::Other => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Series => "Drama series",
            Category::Movie => "Movie",
            Category::Documentary => "Documentary",
            Category::Animation => "Animation",
            Category::Other => "Variety / other",
        }
    }
}

/// Hours, minutes and seconds as entered on the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Hms {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl Hms {
    /// Carries seconds into minutes, then minutes into hours.
    pub fn normalized(hours: u32, minutes: u32, seconds: u64) -> Self {
        let minutes = minutes as u64 + seconds / 60;
        let seconds = seconds % 60;
        let hours = hours as u64 + minutes / 60;
        let minutes = minutes % 60;
        Hms {
            hours: hours.min(u32::MAX as u64) as u32,
            minutes: minutes as u32,
            seconds: seconds as u32,
        }
    }

    pub fn from_seconds(total: u64) -> Self {
        Self::normalized(0, 0, total)
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours as u64 * 3600 + self.minutes as u64 * 60 + self.seconds as u64
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(ParseError::InvalidTimestamp(input.to_string()));
        }
        let mut values = [0u32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .trim()
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidTimestamp(input.to_string()))?;
        }
        Ok(Hms {
            hours: values[0],
            minutes: values[1],
            seconds: values[2],
        })
    }
}

impl fmt::Display for Hms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// Intro and outro boundaries of an item. `None` is stored as `'-1'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimestampPair {
    pub intro: Option<Hms>,
    pub outro: Option<Hms>,
}

static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\(\s*['"]([^'"]*)['"]\s*,\s*['"]([^'"]*)['"]\s*,?\s*\)$"#)
        .expect("timestamp pair pattern is valid")
});

fn parse_optional_hms(value: &str) -> Result<Option<Hms>, ParseError> {
    let value = value.trim();
    if value.is_empty() || value == "-1" {
        return Ok(None);
    }
    Hms::parse(value).map(Some)
}

fn encode_optional_hms(value: Option<Hms>) -> String {
    value.map(|hms| hms.to_string()).unwrap_or_else(|| "-1".to_string())
}

impl TimestampPair {
    pub fn encode(&self) -> String {
        format!(
            "('{}','{}')",
            encode_optional_hms(self.intro),
            encode_optional_hms(self.outro)
        )
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(TimestampPair::default());
        }
        let captures = PAIR_RE
            .captures(input)
            .ok_or_else(|| ParseError::InvalidPair(input.to_string()))?;
        Ok(TimestampPair {
            intro: parse_optional_hms(&captures[1])?,
            outro: parse_optional_hms(&captures[2])?,
        })
    }
}

/// The single intro timestamp of the minimal schema; empty when unset.
pub fn encode_beginning(value: Option<Hms>) -> String {
    value.map(|hms| hms.to_string()).unwrap_or_default()
}

pub fn parse_beginning(input: &str) -> Result<Option<Hms>, ParseError> {
    parse_optional_hms(input)
}

pub fn encode_watermarks(positions: &[WatermarkPosition]) -> String {
    let mut codes: Vec<u8> = positions.iter().map(|p| p.code()).collect();
    codes.sort_unstable();
    codes.dedup();
    let inner: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    format!("[{}]", inner.join(", "))
}

/// Accepts `[1, 3]` as well as the quoted form `['1', '3']`.
pub fn parse_watermarks(input: &str) -> Result<Vec<WatermarkPosition>, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseError::InvalidList(input.to_string()))?;

    let mut positions = Vec::new();
    for element in inner.split(',') {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        let unquoted = element.trim_matches(|c| c == '\'' || c == '"').trim();
        let code = unquoted
            .parse::<u8>()
            .map_err(|_| ParseError::InvalidList(input.to_string()))?;
        let position = WatermarkPosition::from_code(code)
            .ok_or_else(|| ParseError::UnknownCode(unquoted.to_string()))?;
        if !positions.contains(&position) {
            positions.push(position);
        }
    }
    positions.sort();
    Ok(positions)
}

pub fn encode_flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

pub fn parse_flag(input: &str) -> Result<bool, ParseError> {
    match input.trim().to_lowercase().as_str() {
        "" | "0" | "0.0" | "false" | "否" => Ok(false),
        "1" | "1.0" | "true" | "是" => Ok(true),
        _ => Err(ParseError::InvalidFlag(input.to_string())),
    }
}

pub fn encode_category(value: Option<Category>) -> String {
    value.map(|c| c.code().to_string()).unwrap_or_default()
}

pub fn parse_category(input: &str) -> Result<Option<Category>, ParseError> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let code = parse_whole_number(input)?;
    u8::try_from(code)
        .ok()
        .and_then(Category::from_code)
        .map(Some)
        .ok_or_else(|| ParseError::UnknownCode(input.to_string()))
}

/// Integers written by spreadsheet tools sometimes come back as `1080.0`.
pub fn parse_whole_number(input: &str) -> Result<u64, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(0);
    }
    if let Ok(value) = input.parse::<u64>() {
        return Ok(value);
    }
    match input.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        _ => Err(ParseError::InvalidNumber(input.to_string())),
    }
}

pub fn parse_optional_float(input: &str) -> Result<Option<f64>, ParseError> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    input
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ParseError::InvalidNumber(input.to_string()))
}

pub fn parse_optional_text(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(input.to_string())
    }
}

/// Seconds added to the operator-entered outro time: the start of the tail
/// preview window, `duration - 600`, floored at zero.
pub fn outro_base_offset(duration: Option<f64>) -> u64 {
    match duration {
        Some(d) if d.is_finite() && d > TAIL_WINDOW_SECONDS as f64 => {
            (d - TAIL_WINDOW_SECONDS as f64) as u64
        }
        _ => 0,
    }
}

/// Absolute outro boundary from fields entered relative to the tail window.
pub fn outro_from_entry(hours: u32, minutes: u32, seconds: u32, base_offset: u64) -> Hms {
    Hms::normalized(hours, minutes, seconds as u64 + base_offset)
}

/// Inverse of [`outro_from_entry`], used to seed the form.
pub fn outro_to_entry(stored: Hms, base_offset: u64) -> Hms {
    Hms::from_seconds(stored.total_seconds().saturating_sub(base_offset))
}

/// One form submission, broadcast to every row of an item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationValues {
    pub discard: bool,
    pub subtitle: bool,
    pub border: bool,
    pub watermark: Vec<WatermarkPosition>,
    pub timestamps: TimestampPair,
    pub category: Option<Category>,
    pub new_name: Option<String>,
    pub used_time: u64,
}

impl AnnotationValues {
    /// A discarded item keeps only its new name and the time spent on it.
    pub fn discarded(new_name: Option<String>, used_time: u64) -> Self {
        AnnotationValues {
            discard: true,
            new_name,
            used_time,
            ..AnnotationValues::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outro_normalization_carries_once_in_order() {
        let hms = outro_from_entry(1, 10, 70, 0);
        assert_eq!(
            hms,
            Hms {
                hours: 1,
                minutes: 11,
                seconds: 10
            }
        );
    }

    #[test]
    fn test_outro_base_offset_is_added_before_carry() {
        // 45 minute episode: tail window starts at 35:00
        let base = outro_base_offset(Some(2700.0));
        assert_eq!(base, 2100);
        let hms = outro_from_entry(0, 8, 30, base);
        assert_eq!(hms.to_string(), "00:43:30");
        assert_eq!(outro_to_entry(hms, base).to_string(), "00:08:30");
    }

    #[test]
    fn test_outro_base_offset_short_or_unknown_duration() {
        assert_eq!(outro_base_offset(Some(420.0)), 0);
        assert_eq!(outro_base_offset(None), 0);
        assert_eq!(outro_base_offset(Some(f64::NAN)), 0);
        assert_eq!(outro_to_entry(Hms::from_seconds(30), 100), Hms::default());
    }

    #[test]
    fn test_minutes_roll_into_hours() {
        assert_eq!(Hms::normalized(0, 75, 0).to_string(), "01:15:00");
        assert_eq!(Hms::from_seconds(3725).to_string(), "01:02:05");
    }

    #[test]
    fn test_watermark_literal_forms() {
        use WatermarkPosition::*;
        assert_eq!(parse_watermarks("[]").unwrap(), vec![]);
        assert_eq!(parse_watermarks("[1, 3]").unwrap(), vec![TopRight, BottomRight]);
        assert_eq!(parse_watermarks("['0', '2']").unwrap(), vec![TopLeft, BottomLeft]);
        assert_eq!(parse_watermarks("[3,1,3]").unwrap(), vec![TopRight, BottomRight]);
        assert_eq!(encode_watermarks(&[BottomRight, TopRight]), "[1, 3]");
        assert_eq!(encode_watermarks(&[]), "[]");
    }

    #[test]
    fn test_watermark_rejects_garbage() {
        assert!(matches!(parse_watermarks("1, 3"), Err(ParseError::InvalidList(_))));
        assert!(matches!(parse_watermarks("[a]"), Err(ParseError::InvalidList(_))));
        assert!(matches!(parse_watermarks("[7]"), Err(ParseError::UnknownCode(_))));
    }

    #[test]
    fn test_timestamp_pair_literal_forms() {
        let pair = TimestampPair::parse("('00:01:00','00:05:30')").unwrap();
        assert_eq!(pair.intro, Some(Hms { hours: 0, minutes: 1, seconds: 0 }));
        assert_eq!(pair.outro, Some(Hms { hours: 0, minutes: 5, seconds: 30 }));
        assert_eq!(pair.encode(), "('00:01:00','00:05:30')");

        let unset = TimestampPair::parse("('-1', '-1')").unwrap();
        assert_eq!(unset, TimestampPair::default());
        assert_eq!(unset.encode(), "('-1','-1')");

        let double_quoted = TimestampPair::parse(r#"("00:00:10", "-1")"#).unwrap();
        assert_eq!(double_quoted.intro.map(|h| h.total_seconds()), Some(10));
        assert_eq!(double_quoted.outro, None);
    }

    #[test]
    fn test_timestamp_pair_rejects_garbage() {
        assert!(TimestampPair::parse("00:01:00").is_err());
        assert!(TimestampPair::parse("('1:2','-1')").is_err());
    }

    #[test]
    fn test_flags_accept_legacy_values() {
        assert!(parse_flag("1").unwrap());
        assert!(parse_flag("是").unwrap());
        assert!(parse_flag("1.0").unwrap());
        assert!(!parse_flag("否").unwrap());
        assert!(!parse_flag("").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(parse_category("").unwrap(), None);
        assert_eq!(parse_category("2").unwrap(), Some(Category::Documentary));
        assert_eq!(parse_category("1.0").unwrap(), Some(Category::Movie));
        assert!(parse_category("9").is_err());
        assert_eq!(encode_category(Some(Category::Other)), "4");
    }

    #[test]
    fn test_whole_numbers() {
        assert_eq!(parse_whole_number("1080").unwrap(), 1080);
        assert_eq!(parse_whole_number("720.0").unwrap(), 720);
        assert_eq!(parse_whole_number("").unwrap(), 0);
        assert!(parse_whole_number("12.5").is_err());
        assert!(parse_whole_number("-3").is_err());
    }
}
