//! Field parsers for program and workout cells.

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use std::sync::LazyLock;

const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M", "%H.%M"];

const MIN_DISTANCE: u32 = 800;
const MAX_DISTANCE: u32 = 3400;

static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static NON_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `dd/mm/yyyy`, `dd-mm-yyyy` or `dd.mm.yyyy`.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let text = non_empty(raw)?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Parse a post time into `HH:MM`.
pub fn parse_time(raw: Option<&str>) -> Option<String> {
    let text = non_empty(raw)?;
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .map(|t| t.format("%H:%M").to_string())
}

/// Keep only digits (so `1.400 m` is 1400) and require a plausible race distance.
pub fn normalize_distance(raw: Option<&str>) -> Option<u32> {
    let digits: String = raw?.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    (MIN_DISTANCE..=MAX_DISTANCE).contains(&value).then_some(value)
}

/// Lenient float: accepts `,` decimals, `%` and embedded spaces.
pub fn parse_float(raw: Option<&str>) -> Option<f64> {
    let text = non_empty(raw)?;
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '%' && !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_int(raw: Option<&str>) -> Option<i64> {
    parse_float(raw).map(|v| v.round() as i64)
}

/// Public-money fraction; values above 1.5 are read as percentages.
pub fn parse_public_money(raw: Option<&str>) -> Option<f64> {
    let mut value = parse_float(raw)?;
    if value > 1.5 {
        value /= 100.0;
    }
    Some(value.clamp(0.0, 1.0))
}

/// Parse a best-time cell into seconds.
///
/// `1.35.40` and `1:35.40` are minutes, seconds and hundredths; `95.4` and `58,123`
/// are seconds with a fraction; `1:35` is minutes and seconds; `h:m:s` needs two colons.
pub fn parse_best_time(raw: Option<&str>) -> Option<f64> {
    let text = non_empty(raw)?;
    let parts: Vec<&str> = text.split([':', '.', ',']).collect();
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let colons = text.matches(':').count();
    let has_fraction_sep = text.contains(['.', ',']);
    let (h, m, s, frac) = match parts.as_slice() {
        [s] => (None, None, *s, None),
        [m, s] if colons == 1 && !has_fraction_sep => (None, Some(*m), *s, None),
        [s, frac] => (None, None, *s, Some(*frac)),
        [h, m, s] if colons == 2 => (Some(*h), Some(*m), *s, None),
        [m, s, frac] => (None, Some(*m), *s, Some(*frac)),
        [h, m, s, frac] => (Some(*h), Some(*m), *s, Some(*frac)),
        _ => return None,
    };
    let unit = |v: Option<&str>| v.and_then(|x| x.parse::<f64>().ok()).unwrap_or(0.0);
    let mut total = unit(h) * 3600.0 + unit(m) * 60.0 + unit(Some(s));
    if let Some(frac) = frac {
        if frac.len() >= 3 {
            total += unit(Some(&frac[..3])) / 1000.0;
        } else {
            total += unit(Some(frac)) / 10f64.powi(frac.len() as i32);
        }
    }
    Some(total)
}

/// Fold Turkish and Latin-1 accented letters to ASCII; other non-ASCII is dropped.
fn ascii_fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let folded = match c {
            'ç' | 'Ç' => "c",
            'ğ' | 'Ğ' => "g",
            'ı' | 'İ' | 'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => "i",
            'ö' | 'Ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ø' => "o",
            'ş' | 'Ş' => "s",
            'ü' | 'Ü' | 'ú' | 'ù' | 'û' | 'Ú' | 'Ù' | 'Û' => "u",
            'â' | 'á' | 'à' | 'ä' | 'ã' | 'å' | 'Â' | 'Á' | 'À' | 'Ä' | 'Ã' | 'Å' => "a",
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => "e",
            'ñ' | 'Ñ' => "n",
            'ý' | 'ÿ' | 'Ý' => "y",
            'æ' | 'Æ' => "ae",
            'ß' => "ss",
            c if c.is_ascii() => {
                out.push(c);
                continue;
            }
            _ => continue,
        };
        out.push_str(folded);
    }
    out
}

/// Lowercase ASCII slug; empty input becomes `n-a`.
pub fn slugify(text: &str) -> String {
    let lowered = ascii_fold(text).to_ascii_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "n-a".to_string()
    } else {
        slug.to_string()
    }
}

/// Token for a sire/dam name: lowercase ASCII with `_` for spaces.
pub fn genealogy_token(raw: Option<&str>) -> Option<String> {
    let lowered = ascii_fold(raw?).to_ascii_lowercase().replace(' ', "_");
    let token = NON_TOKEN.replace_all(&lowered, "");
    (!token.is_empty()).then(|| token.into_owned())
}
