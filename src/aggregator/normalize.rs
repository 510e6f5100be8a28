use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::aggregator::dedupe;
use crate::models::job::JobRecord;
use crate::providers::RawJobRecord;

/// A record that cannot become a canonical `JobRecord`. Dropped and counted
/// by the orchestrator, never fatal for a run.
#[derive(Debug, thiserror::Error)]
#[error("record {provider}/{native_id} missing required field '{field}'")]
pub struct NormalizeError {
    provider: String,
    native_id: String,
    field: &'static str,
}

/// Intermediate shape shared by the per-provider extractors.
#[derive(Debug, Default)]
struct Extracted {
    title: Option<String>,
    company: Option<String>,
    location: Option<String>,
    country: Option<String>,
    description: Option<String>,
    apply_url: Option<String>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    salary_currency: Option<String>,
    salary_text: Option<String>,
    job_type: Option<String>,
    is_remote: bool,
    posted_at: Option<DateTime<Utc>>,
}

/// Map a provider-native payload into the canonical schema. Pure: no I/O, no
/// shared state. Fails only when title, company, or an apply URL is entirely
/// absent after provider-specific fallbacks.
pub fn normalize(raw: &RawJobRecord, fallback_country: &str) -> Result<JobRecord, NormalizeError> {
    let payload = &raw.payload;
    let mut fields = match raw.provider.as_str() {
        "adzuna" => extract_adzuna(payload),
        "jsearch" => extract_jsearch(payload),
        "jooble" => extract_jooble(payload),
        _ => extract_generic(payload),
    };

    // Free-text salary only fills gaps left by numeric fields.
    if fields.salary_min.is_none() && fields.salary_max.is_none() {
        if let Some(text) = &fields.salary_text {
            let (min, max, currency) = parse_salary(text);
            fields.salary_min = min;
            fields.salary_max = max;
            if fields.salary_currency.is_none() {
                fields.salary_currency = currency;
            }
        }
    }

    if fields.salary_currency.is_none()
        && (fields.salary_min.is_some() || fields.salary_max.is_some())
        && raw.provider == "adzuna"
    {
        fields.salary_currency = currency_for_country(fallback_country).map(str::to_string);
    }

    let missing = |field: &'static str| NormalizeError {
        provider: raw.provider.clone(),
        native_id: raw.native_id.clone(),
        field,
    };

    let title = fields
        .title
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("title"))?;
    let company = fields
        .company
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("company"))?;
    let apply_url = fields
        .apply_url
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("apply_url"))?;

    let location = fields.location.unwrap_or_default();
    let is_remote = fields.is_remote || location.to_lowercase().contains("remote");
    let country = fields
        .country
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| fallback_country.to_string())
        .trim()
        .to_lowercase();

    Ok(JobRecord {
        fingerprint: dedupe::fingerprint(&title, &company, &location),
        source: raw.provider.clone(),
        source_id: raw.native_id.clone(),
        title,
        company,
        location,
        country,
        description: fields.description.unwrap_or_default(),
        apply_url,
        salary_min: fields.salary_min,
        salary_max: fields.salary_max,
        salary_currency: fields.salary_currency,
        job_type: fields.job_type,
        is_remote,
        posted_at: fields.posted_at,
        raw_payload: Some(raw.payload.clone()),
    })
}

fn extract_adzuna(payload: &Value) -> Extracted {
    let salary_min = f64_at(payload, &["salary_min"]);
    let salary_max = f64_at(payload, &["salary_max"]);
    Extracted {
        title: own(str_at(payload, &["title"])),
        company: own(str_at(payload, &["company", "display_name"])),
        location: own(str_at(payload, &["location", "display_name"])),
        // Adzuna's search is already country-scoped by the URL path.
        country: None,
        description: own(str_at(payload, &["description"])),
        apply_url: own(str_at(payload, &["redirect_url"])),
        salary_min,
        salary_max,
        // Adzuna reports amounts in the searched country's market currency
        // without naming it; resolved from the country in `normalize`.
        salary_currency: None,
        salary_text: None,
        job_type: map_contract_time(
            str_at(payload, &["contract_time"]),
            str_at(payload, &["contract_type"]),
        ),
        is_remote: false,
        posted_at: str_at(payload, &["created"]).and_then(parse_timestamp),
    }
}

fn extract_jsearch(payload: &Value) -> Extracted {
    let city = str_at(payload, &["job_city"]);
    let state = str_at(payload, &["job_state"]);
    let location = match (city, state) {
        (Some(city), Some(state)) => Some(format!("{city}, {state}")),
        (Some(city), None) => Some(city.to_string()),
        (None, Some(state)) => Some(state.to_string()),
        (None, None) => own(str_at(payload, &["job_location"])),
    };
    Extracted {
        title: own(str_at(payload, &["job_title"])),
        company: own(str_at(payload, &["employer_name"])),
        location,
        country: own(str_at(payload, &["job_country"])),
        description: own(str_at(payload, &["job_description"])),
        apply_url: own(str_at(payload, &["job_apply_link"])),
        salary_min: f64_at(payload, &["job_min_salary"])
            .or_else(|| f64_at(payload, &["job_salary", "salary_min"])),
        salary_max: f64_at(payload, &["job_max_salary"])
            .or_else(|| f64_at(payload, &["job_salary", "salary_max"])),
        salary_currency: own(str_at(payload, &["job_salary_currency"]))
            .or_else(|| own(str_at(payload, &["job_salary", "salary_currency"]))),
        salary_text: None,
        job_type: own(str_at(payload, &["job_employment_type"])).map(|t| title_case(&t)),
        is_remote: payload
            .get("job_is_remote")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        posted_at: str_at(payload, &["job_posted_at_datetime_utc"]).and_then(parse_timestamp),
    }
}

fn extract_jooble(payload: &Value) -> Extracted {
    Extracted {
        title: own(str_at(payload, &["title"])),
        company: own(str_at(payload, &["company"])),
        location: own(str_at(payload, &["location"])),
        country: None,
        description: own(str_at(payload, &["snippet"])),
        apply_url: own(str_at(payload, &["link"])),
        salary_min: None,
        salary_max: None,
        salary_currency: None,
        salary_text: own(str_at(payload, &["salary"])),
        job_type: own(str_at(payload, &["type"])),
        is_remote: false,
        posted_at: str_at(payload, &["updated"]).and_then(parse_timestamp),
    }
}

/// Fallback for sources without a dedicated extractor (manually seeded
/// records go through the same adapter contract and land here).
fn extract_generic(payload: &Value) -> Extracted {
    Extracted {
        title: own(first_str(payload, &["title", "job_title"])),
        company: own(first_str(payload, &["company", "company_name", "employer_name"])),
        location: own(first_str(payload, &["location"])),
        country: own(first_str(payload, &["country"])),
        description: own(first_str(payload, &["description", "snippet"])),
        apply_url: own(first_str(payload, &["apply_url", "url", "link", "redirect_url"])),
        salary_min: f64_at(payload, &["salary_min"]),
        salary_max: f64_at(payload, &["salary_max"]),
        salary_currency: own(first_str(payload, &["salary_currency"])),
        salary_text: own(first_str(payload, &["salary"])),
        job_type: own(first_str(payload, &["job_type", "type"])),
        is_remote: payload
            .get("is_remote")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        posted_at: first_str(payload, &["posted_at", "created", "updated"])
            .and_then(parse_timestamp),
    }
}

/// Parse a loosely formatted salary string into numeric min/max plus an ISO
/// currency code. Handles ranges, thousands separators, `k` and `LPA`/lakh
/// suffixes, and common currency markers. Ambiguous input yields all-None
/// rather than a guess.
pub fn parse_salary(text: &str) -> (Option<f64>, Option<f64>, Option<String>) {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return (None, None, None);
    }
    let currency = detect_currency(&lower);

    let normalized = lower.replace('\u{2013}', "-").replace('\u{2014}', "-");
    let parts: Vec<&str> = if normalized.contains(" to ") {
        normalized.splitn(2, " to ").collect()
    } else {
        normalized.splitn(2, '-').collect()
    };

    let first = parts.first().and_then(|p| parse_amount(p));
    let second = parts.get(1).and_then(|p| parse_amount(p));

    match (first, second) {
        (Some((mut min, min_mult)), Some((max, max_mult))) => {
            // "12-15 lpa": the shared multiplier trails the range.
            if min_mult.is_none()
                && let Some(mult) = max_mult
            {
                min *= mult;
            }
            if min > max {
                return (None, None, None);
            }
            (Some(min), Some(max), currency)
        }
        (Some((value, _)), None) if parts.len() == 1 => (Some(value), Some(value), currency),
        _ => (None, None, None),
    }
}

/// One side of a salary range: the numeric value (multiplier applied) and
/// the multiplier itself, if any, so range parsing can propagate it.
fn parse_amount(part: &str) -> Option<(f64, Option<f64>)> {
    let mut s = part.trim().to_string();
    for marker in [
        "per annum", "per year", "a year", "p.a.", "/year", "/yr", "inr", "usd", "gbp", "eur",
        "aed", "₹", "$", "£", "€", "rs.", "rs",
    ] {
        s = s.replace(marker, " ");
    }
    let s = s.trim();

    let (s, multiplier) = if let Some(stripped) = strip_any(s, &["lakhs", "lakh", "lpa"]) {
        (stripped, Some(100_000.0))
    } else if let Some(stripped) = strip_any(s, &["k"]) {
        (stripped, Some(1_000.0))
    } else {
        (s.to_string(), None)
    };

    let digits: String = s.replace([',', ' '], "");
    if digits.is_empty() || digits.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    if value <= 0.0 {
        return None;
    }
    Some((value * multiplier.unwrap_or(1.0), multiplier))
}

fn strip_any(s: &str, suffixes: &[&str]) -> Option<String> {
    for suffix in suffixes {
        if let Some(stripped) = s.strip_suffix(suffix) {
            return Some(stripped.trim().to_string());
        }
    }
    None
}

fn detect_currency(lower: &str) -> Option<String> {
    let code = if lower.contains('₹')
        || lower.contains("inr")
        || lower.contains("lpa")
        || lower.contains("lakh")
        || lower.contains("rs.")
        || lower.starts_with("rs ")
    {
        "INR"
    } else if lower.contains('$') || lower.contains("usd") {
        "USD"
    } else if lower.contains('£') || lower.contains("gbp") {
        "GBP"
    } else if lower.contains('€') || lower.contains("eur") {
        "EUR"
    } else if lower.contains("aed") {
        "AED"
    } else {
        return None;
    };
    Some(code.to_string())
}

/// Market currency for a country code, used when a provider reports numeric
/// salaries without naming the currency (Adzuna does this).
pub fn currency_for_country(country: &str) -> Option<&'static str> {
    match country.trim().to_lowercase().as_str() {
        "in" => Some("INR"),
        "us" => Some("USD"),
        "gb" | "uk" => Some("GBP"),
        "ae" => Some("AED"),
        "ca" => Some("CAD"),
        "au" => Some("AUD"),
        "sg" => Some("SGD"),
        "nz" => Some("NZD"),
        "za" => Some("ZAR"),
        "br" => Some("BRL"),
        "mx" => Some("MXN"),
        "pl" => Some("PLN"),
        "de" | "fr" | "it" | "es" | "nl" | "be" | "at" => Some("EUR"),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn map_contract_time(contract_time: Option<&str>, contract_type: Option<&str>) -> Option<String> {
    match contract_time {
        Some("full_time") => Some("Full-time".to_string()),
        Some("part_time") => Some("Part-time".to_string()),
        _ => match contract_type {
            Some("contract") => Some("Contract".to_string()),
            Some("permanent") => Some("Full-time".to_string()),
            _ => None,
        },
    }
}

fn title_case(s: &str) -> String {
    let lower = s.to_lowercase().replace('_', "-");
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => lower,
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().filter(|s| !s.trim().is_empty())
}

fn f64_at(value: &Value, path: &[&str]) -> Option<f64> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_f64().filter(|v| *v > 0.0)
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| str_at(value, &[key]))
}

fn own(s: Option<&str>) -> Option<String> {
    s.map(|s| s.trim().to_string())
}
