//! Variable substitution and modifier rules for synthesized filenames.
//!
//! Signatures capture fragments of a save's comment text through regex
//! groups; this module turns those captures into concrete filename text and,
//! where the signature declares date/time roles, a reconstructed timestamp.

use crate::error::ModifierError;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Deserialize;
use std::collections::HashMap;

/// What a captured variable contributes to the synthesized entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarRole {
    /// Plain filename text (the default).
    #[default]
    Filename,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    AmPm,
}

/// How a variable's raw capture is re-rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    #[default]
    String,
    /// Decimal rendering of the computed integer form.
    Number,
    /// The computed character form; the capture must be exactly one char.
    Char,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarAlign {
    #[default]
    Right,
    Left,
}

/// Per-variable rendering and interpretation rules from a signature.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VarModifier {
    pub use_as: VarRole,
    #[serde(rename = "type")]
    pub kind: VarKind,
    pub min_width: usize,
    pub fill: char,
    pub align: VarAlign,
    /// Added to the integer and character forms before re-rendering.
    pub add: i64,
}

impl Default for VarModifier {
    fn default() -> Self {
        Self {
            use_as: VarRole::Filename,
            kind: VarKind::String,
            min_width: 0,
            fill: ' ',
            align: VarAlign::Right,
            add: 0,
        }
    }
}

/// Replace `$NAME`, `${NAME}` and `$(NAME)` references in `template`.
///
/// Unknown, empty or unterminated references are emitted verbatim, framing
/// included, so a bad template still yields a diagnosable filename.
pub fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some((open_at, open @ ('{' | '('))) => {
                let close = if open == '{' { '}' } else { ')' };
                let rest = &template[open_at + 1..];

                match rest.find(|c: char| c == close) {
                    Some(end) => {
                        let name = &rest[..end];
                        // Consume the framed reference either way.
                        for _ in 0..name.chars().count() + 2 {
                            chars.next();
                        }
                        match lookup(vars, name) {
                            Some(value) => out.push_str(value),
                            None => {
                                out.push('$');
                                out.push(open);
                                out.push_str(name);
                                out.push(close);
                            }
                        }
                    }
                    // No closing delimiter: the '$' is literal text.
                    None => out.push('$'),
                }
            }
            _ => {
                let mut name = String::new();
                while let Some(&(_, w)) = chars.peek() {
                    if w.is_ascii_alphanumeric() || w == '_' {
                        name.push(w);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if name.is_empty() {
                    out.push('$');
                } else {
                    match lookup(vars, &name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('$');
                            out.push_str(&name);
                        }
                    }
                }
            }
        }
    }

    out
}

fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a String> {
    if name.is_empty() {
        None
    } else {
        vars.get(name)
    }
}

/// Remap fullwidth forms (U+FF01..=U+FF5E) to their ASCII equivalents.
///
/// Japanese save comments frequently record numbers in fullwidth digits;
/// pure-ASCII input passes through unchanged.
pub fn remap_fullwidth(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => {
                char::from_u32(c as u32 - 0xFEE0).unwrap_or(c)
            }
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

/// Lenient decimal parse: fullwidth digits are remapped first, and text
/// that still fails to parse yields 0.
pub fn parse_integer(text: &str) -> i64 {
    remap_fullwidth(text).trim().parse().unwrap_or(0)
}

/// Timestamp components gathered while applying modifiers.
#[derive(Debug, Default, Clone, Copy)]
struct TimeFields {
    year: Option<i64>,
    month: Option<i64>,
    day: Option<i64>,
    hour: Option<i64>,
    minute: Option<i64>,
    second: Option<i64>,
    pm: Option<bool>,
}

impl TimeFields {
    fn has_date(&self) -> bool {
        self.year.is_some() || self.month.is_some() || self.day.is_some()
    }

    fn has_time(&self) -> bool {
        self.hour.is_some() || self.minute.is_some() || self.second.is_some()
    }

    fn is_empty(&self) -> bool {
        !self.has_date() && !self.has_time() && self.pm.is_none()
    }
}

/// Apply modifiers against the current wall clock.
pub fn apply_modifiers(
    modifiers: &HashMap<String, VarModifier>,
    vars: &HashMap<String, String>,
) -> Result<(HashMap<String, String>, Option<NaiveDateTime>), ModifierError> {
    apply_modifiers_at(modifiers, vars, chrono::Local::now().naive_local())
}

/// Apply modifiers with an explicit "now", used for the rollback heuristic.
///
/// Every variable present in both maps is re-rendered per its modifier;
/// variables without a modifier pass through untouched. Timestamp-role
/// variables additionally feed the assembled timestamp, and any range
/// violation fails the whole operation.
pub fn apply_modifiers_at(
    modifiers: &HashMap<String, VarModifier>,
    vars: &HashMap<String, String>,
    now: NaiveDateTime,
) -> Result<(HashMap<String, String>, Option<NaiveDateTime>), ModifierError> {
    let mut out = vars.clone();
    let mut fields = TimeFields::default();

    for (name, modifier) in modifiers {
        let Some(raw) = vars.get(name) else {
            continue;
        };

        let int_value = parse_integer(raw) + modifier.add;
        let char_value = single_char(raw).and_then(|c| {
            u32::try_from(c as i64 + modifier.add)
                .ok()
                .and_then(char::from_u32)
        });

        let rendered = match modifier.kind {
            VarKind::String => raw.clone(),
            VarKind::Number => int_value.to_string(),
            VarKind::Char => char_value
                .ok_or_else(|| ModifierError::NotSingleChar(name.clone(), raw.clone()))?
                .to_string(),
        };

        out.insert(name.clone(), pad(&rendered, modifier));

        match modifier.use_as {
            VarRole::Filename => {}
            VarRole::Year => {
                fields.year = Some(match int_value {
                    0..=99 => int_value + 2000,
                    2000..=9999 => int_value,
                    _ => return Err(ModifierError::YearOutOfRange(int_value)),
                });
            }
            VarRole::Month => {
                if !(1..=12).contains(&int_value) {
                    return Err(ModifierError::MonthOutOfRange(int_value));
                }
                fields.month = Some(int_value);
            }
            VarRole::Day => {
                if !(1..=31).contains(&int_value) {
                    return Err(ModifierError::DayOutOfRange(int_value));
                }
                fields.day = Some(int_value);
            }
            VarRole::Hour => {
                if !(0..=23).contains(&int_value) {
                    return Err(ModifierError::HourOutOfRange(int_value));
                }
                fields.hour = Some(int_value);
            }
            VarRole::Minute => {
                if !(0..=59).contains(&int_value) {
                    return Err(ModifierError::MinuteOutOfRange(int_value));
                }
                fields.minute = Some(int_value);
            }
            VarRole::Second => {
                if !(0..=59).contains(&int_value) {
                    return Err(ModifierError::SecondOutOfRange(int_value));
                }
                fields.second = Some(int_value);
            }
            VarRole::AmPm => {
                fields.pm = Some(is_pm(raw, int_value));
            }
        }
    }

    let timestamp = if fields.is_empty() {
        None
    } else {
        Some(assemble_timestamp(fields, now))
    };

    Ok((out, timestamp))
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    let c = chars.next()?;
    chars.next().is_none().then_some(c)
}

fn pad(text: &str, modifier: &VarModifier) -> String {
    let width = text.chars().count();
    if width >= modifier.min_width {
        return text.to_string();
    }

    let filler: String = std::iter::repeat(modifier.fill)
        .take(modifier.min_width - width)
        .collect();
    match modifier.align {
        VarAlign::Right => format!("{}{}", filler, text),
        VarAlign::Left => format!("{}{}", text, filler),
    }
}

fn is_pm(raw: &str, int_value: i64) -> bool {
    match raw.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('P') => true,
        Some('A') => false,
        _ => int_value != 0,
    }
}

/// Build the final timestamp from the collected fields.
///
/// Supplied date fields overwrite today's; a supplied date with no time
/// defaults the time to midnight, otherwise unsupplied time fields default
/// to the current time. If the result lands more than one day in the future
/// (one day of slack tolerates timezone skew) and the current year is
/// plausible for the hardware generation, one year is subtracted to undo
/// two-digit-year ambiguity.
fn assemble_timestamp(fields: TimeFields, now: NaiveDateTime) -> NaiveDateTime {
    let year = fields.year.unwrap_or_else(|| now.year() as i64) as i32;
    let month = fields.month.unwrap_or_else(|| now.month() as i64) as u32;
    let day = fields.day.unwrap_or_else(|| now.day() as i64) as u32;

    let date = clamped_date(year, month, day);

    let time = if fields.has_date() && !fields.has_time() {
        NaiveTime::MIN
    } else {
        let mut hour = fields.hour.unwrap_or_else(|| now.hour() as i64) as u32;
        let minute = fields.minute.unwrap_or_else(|| now.minute() as i64) as u32;
        let second = fields.second.unwrap_or_else(|| now.second() as i64) as u32;

        match fields.pm {
            Some(true) if hour < 12 => hour += 12,
            Some(false) if hour == 12 => hour = 0,
            _ => {}
        }

        NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
    };

    let mut ts = date.and_time(time);

    // Two-digit years can land one year ahead of reality.
    if ts > now + Duration::days(1) && now.year() > 1995 {
        ts = clamped_date(ts.year() - 1, ts.month(), ts.day()).and_time(ts.time());
    }

    ts
}

/// Build a date, pulling the day back to the end of the month when the raw
/// combination is invalid (day range checks only guarantee 1-31).
fn clamped_date(year: i32, month: u32, day: u32) -> NaiveDate {
    if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
        return date;
    }
    for d in (28..day).rev() {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, d) {
            return date;
        }
    }
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2005, 3, 10)
            .unwrap()
            .and_hms_opt(14, 30, 45)
            .unwrap()
    }

    #[test]
    fn test_substitute_all_three_forms() {
        let vars = vars(&[("F1", "Link"), ("G2", "07")]);
        assert_eq!(substitute("zelda-$F1-${G2}-$(F1)", &vars), "zelda-Link-07-Link");
    }

    #[test]
    fn test_substitute_unknown_is_verbatim() {
        let vars = vars(&[("F1", "x")]);
        assert_eq!(substitute("$NOPE ${NOPE} $(NOPE) ${} $", &vars), "$NOPE ${NOPE} $(NOPE) ${} $");
    }

    #[test]
    fn test_substitute_unterminated_frame() {
        let vars = vars(&[("F1", "x")]);
        assert_eq!(substitute("file${F1", &vars), "file${F1");
    }

    #[test]
    fn test_substitute_no_double_substitution() {
        // A substituted value containing a '$' must not be expanded again.
        let vars = vars(&[("A", "$B"), ("B", "boom")]);
        assert_eq!(substitute("$A", &vars), "$B");
    }

    #[test]
    fn test_remap_fullwidth_idempotent_on_ascii() {
        let ascii = "Save 12 File_3";
        assert_eq!(remap_fullwidth(ascii), ascii);
        assert_eq!(parse_integer("42"), parse_integer(&remap_fullwidth("42")));
    }

    #[test]
    fn test_parse_integer_fullwidth_digits() {
        assert_eq!(parse_integer("\u{FF11}\u{FF12}"), 12);
        assert_eq!(parse_integer("  7 "), 7);
        assert_eq!(parse_integer("junk"), 0);
    }

    #[test]
    fn test_number_modifier_with_padding() {
        let mods = HashMap::from([(
            "G1".to_string(),
            VarModifier {
                kind: VarKind::Number,
                min_width: 3,
                fill: '0',
                add: 1,
                ..VarModifier::default()
            },
        )]);
        let (out, ts) = apply_modifiers_at(&mods, &vars(&[("G1", "8")]), now()).unwrap();
        assert_eq!(out["G1"], "009");
        assert!(ts.is_none());
    }

    #[test]
    fn test_left_aligned_string_padding() {
        let mods = HashMap::from([(
            "F1".to_string(),
            VarModifier {
                min_width: 5,
                fill: '_',
                align: VarAlign::Left,
                ..VarModifier::default()
            },
        )]);
        let (out, _) = apply_modifiers_at(&mods, &vars(&[("F1", "abc")]), now()).unwrap();
        assert_eq!(out["F1"], "abc__");
    }

    #[test]
    fn test_char_modifier_offsets_single_char() {
        let mods = HashMap::from([(
            "F1".to_string(),
            VarModifier {
                kind: VarKind::Char,
                add: 1,
                ..VarModifier::default()
            },
        )]);
        let (out, _) = apply_modifiers_at(&mods, &vars(&[("F1", "A")]), now()).unwrap();
        assert_eq!(out["F1"], "B");

        let err = apply_modifiers_at(&mods, &vars(&[("F1", "AB")]), now()).unwrap_err();
        assert_eq!(
            err,
            ModifierError::NotSingleChar("F1".to_string(), "AB".to_string())
        );
    }

    #[test]
    fn test_year_component_ranges() {
        let mods = HashMap::from([(
            "G1".to_string(),
            VarModifier {
                use_as: VarRole::Year,
                kind: VarKind::Number,
                ..VarModifier::default()
            },
        )]);

        let (_, ts) = apply_modifiers_at(&mods, &vars(&[("G1", "3")]), now()).unwrap();
        assert_eq!(ts.unwrap().year(), 2003);

        let (_, ts) = apply_modifiers_at(&mods, &vars(&[("G1", "2004")]), now()).unwrap();
        assert_eq!(ts.unwrap().year(), 2004);

        let err = apply_modifiers_at(&mods, &vars(&[("G1", "150")]), now()).unwrap_err();
        assert_eq!(err, ModifierError::YearOutOfRange(150));
    }

    #[test]
    fn test_month_out_of_range_fails_whole_operation() {
        let mods = HashMap::from([(
            "G1".to_string(),
            VarModifier {
                use_as: VarRole::Month,
                ..VarModifier::default()
            },
        )]);
        let err = apply_modifiers_at(&mods, &vars(&[("G1", "13")]), now()).unwrap_err();
        assert_eq!(err, ModifierError::MonthOutOfRange(13));
    }

    #[test]
    fn test_date_without_time_defaults_to_midnight() {
        let mods = HashMap::from([
            (
                "G1".to_string(),
                VarModifier {
                    use_as: VarRole::Month,
                    ..VarModifier::default()
                },
            ),
            (
                "G2".to_string(),
                VarModifier {
                    use_as: VarRole::Day,
                    ..VarModifier::default()
                },
            ),
        ]);
        let (_, ts) =
            apply_modifiers_at(&mods, &vars(&[("G1", "2"), ("G2", "14")]), now()).unwrap();
        let ts = ts.unwrap();
        assert_eq!((ts.month(), ts.day()), (2, 14));
        assert_eq!(ts.time(), NaiveTime::MIN);
        // Unsupplied year comes from "now".
        assert_eq!(ts.year(), 2005);
    }

    #[test]
    fn test_time_without_date_uses_current_date() {
        let mods = HashMap::from([(
            "F1".to_string(),
            VarModifier {
                use_as: VarRole::Hour,
                ..VarModifier::default()
            },
        )]);
        let (_, ts) = apply_modifiers_at(&mods, &vars(&[("F1", "9")]), now()).unwrap();
        let ts = ts.unwrap();
        assert_eq!(ts.date(), now().date());
        assert_eq!(ts.hour(), 9);
        // Unsupplied minute/second come from the current time.
        assert_eq!((ts.minute(), ts.second()), (30, 45));
    }

    #[test]
    fn test_ampm_adjustment() {
        let mods = HashMap::from([
            (
                "F1".to_string(),
                VarModifier {
                    use_as: VarRole::Hour,
                    ..VarModifier::default()
                },
            ),
            (
                "F2".to_string(),
                VarModifier {
                    use_as: VarRole::AmPm,
                    ..VarModifier::default()
                },
            ),
        ]);

        let (_, ts) =
            apply_modifiers_at(&mods, &vars(&[("F1", "7"), ("F2", "PM")]), now()).unwrap();
        assert_eq!(ts.unwrap().hour(), 19);

        let (_, ts) =
            apply_modifiers_at(&mods, &vars(&[("F1", "12"), ("F2", "AM")]), now()).unwrap();
        assert_eq!(ts.unwrap().hour(), 0);
    }

    #[test]
    fn test_future_timestamp_rolled_back_one_year() {
        let mods = HashMap::from([
            (
                "G1".to_string(),
                VarModifier {
                    use_as: VarRole::Year,
                    ..VarModifier::default()
                },
            ),
            (
                "G2".to_string(),
                VarModifier {
                    use_as: VarRole::Month,
                    ..VarModifier::default()
                },
            ),
            (
                "G3".to_string(),
                VarModifier {
                    use_as: VarRole::Day,
                    ..VarModifier::default()
                },
            ),
        ]);

        let now_1999 = NaiveDate::from_ymd_opt(1999, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let input = vars(&[("G1", "2000"), ("G2", "6"), ("G3", "15")]);
        let (_, ts) = apply_modifiers_at(&mods, &input, now_1999).unwrap();
        assert_eq!(ts.unwrap().date(), NaiveDate::from_ymd_opt(1999, 6, 15).unwrap());
    }

    #[test]
    fn test_today_is_not_rolled_back() {
        let mods = HashMap::from([
            (
                "G1".to_string(),
                VarModifier {
                    use_as: VarRole::Month,
                    ..VarModifier::default()
                },
            ),
            (
                "G2".to_string(),
                VarModifier {
                    use_as: VarRole::Day,
                    ..VarModifier::default()
                },
            ),
        ]);
        let (_, ts) =
            apply_modifiers_at(&mods, &vars(&[("G1", "3"), ("G2", "10")]), now()).unwrap();
        assert_eq!(ts.unwrap().date(), now().date());
    }

    #[test]
    fn test_invalid_day_for_month_is_clamped() {
        let mods = HashMap::from([
            (
                "G1".to_string(),
                VarModifier {
                    use_as: VarRole::Month,
                    ..VarModifier::default()
                },
            ),
            (
                "G2".to_string(),
                VarModifier {
                    use_as: VarRole::Day,
                    ..VarModifier::default()
                },
            ),
        ]);
        let (_, ts) =
            apply_modifiers_at(&mods, &vars(&[("G1", "2"), ("G2", "31")]), now()).unwrap();
        assert_eq!(ts.unwrap().date(), NaiveDate::from_ymd_opt(2005, 2, 28).unwrap());
    }
}
