use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use crate::models::job::JobRecord;

/// Legal suffixes stripped from company names before fingerprinting, so
/// "Acme Inc." and "ACME" hash the same.
const COMPANY_SUFFIXES: &[&str] = &[
    "inc",
    "ltd",
    "llc",
    "llp",
    "pvt",
    "limited",
    "corp",
    "corporation",
    "incorporated",
    "co",
    "gmbh",
    "plc",
];

/// Cross-provider identity for a job posting: a hash of the normalized
/// title, company, and city. Deliberately a heuristic, because each provider
/// phrases and locates the same posting slightly differently.
pub fn fingerprint(title: &str, company: &str, location: &str) -> String {
    let composite = format!(
        "{}|{}|{}",
        normalize_text(title),
        normalize_company(company),
        city_token(location),
    );
    hex::encode(Sha256::digest(composite.as_bytes()))
}

/// Lowercase and collapse runs of whitespace.
fn normalize_text(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_company(s: &str) -> String {
    let mut tokens: Vec<String> = normalize_text(s)
        .split(' ')
        .map(|t| t.trim_matches(|c: char| c == '.' || c == ',').to_string())
        .filter(|t| !t.is_empty())
        .collect();
    // Strip repeatedly so "Acme Pvt. Ltd." reduces to "acme".
    while tokens.len() > 1
        && COMPANY_SUFFIXES.contains(&tokens.last().map(String::as_str).unwrap_or(""))
    {
        tokens.pop();
    }
    tokens.join(" ")
}

/// City-level token only: "Bengaluru, Karnataka" and "Bengaluru" match.
fn city_token(location: &str) -> String {
    normalize_text(location.split(',').next().unwrap_or(""))
}

#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub records: Vec<JobRecord>,
    /// Duplicates merged into an earlier-seen winner.
    pub merged: usize,
}

/// Merge a run's records into a duplicate-free set.
///
/// Identity is `(source, source_id)` within a provider and `fingerprint`
/// across providers. The winner of a collision is the earliest-seen record
/// under a stable sort by `(posted_at, source, source_id)`, which makes the
/// result independent of fan-out arrival order. Winners keep their
/// provenance; empty fields are backfilled from losers, never overwritten.
pub fn dedupe(mut records: Vec<JobRecord>) -> DedupeOutcome {
    records.sort_by(|a, b| {
        (a.posted_at, &a.source, &a.source_id).cmp(&(b.posted_at, &b.source, &b.source_id))
    });

    let mut by_provenance: HashMap<(String, String), usize> = HashMap::new();
    let mut by_fingerprint: HashMap<String, usize> = HashMap::new();
    let mut out = DedupeOutcome::default();

    for record in records {
        let provenance = (record.source.clone(), record.source_id.clone());
        let winner_idx = by_provenance
            .get(&provenance)
            .or_else(|| by_fingerprint.get(&record.fingerprint))
            .copied();

        match winner_idx {
            Some(idx) => {
                backfill(&mut out.records[idx], &record);
                out.merged += 1;
            }
            None => {
                let idx = out.records.len();
                by_provenance.insert(provenance, idx);
                by_fingerprint.insert(record.fingerprint.clone(), idx);
                out.records.push(record);
            }
        }
    }
    out
}

/// Copy any field the winner is missing from the duplicate. Provenance
/// (`source`, `source_id`, `raw_payload`) is never merged.
fn backfill(winner: &mut JobRecord, duplicate: &JobRecord) {
    fill_str(&mut winner.location, &duplicate.location);
    fill_str(&mut winner.country, &duplicate.country);
    fill_str(&mut winner.description, &duplicate.description);
    fill_str(&mut winner.apply_url, &duplicate.apply_url);
    if winner.salary_min.is_none() {
        winner.salary_min = duplicate.salary_min;
    }
    if winner.salary_max.is_none() {
        winner.salary_max = duplicate.salary_max;
    }
    if winner.salary_currency.is_none() {
        winner.salary_currency = duplicate.salary_currency.clone();
    }
    if winner.job_type.is_none() {
        winner.job_type = duplicate.job_type.clone();
    }
    if winner.posted_at.is_none() {
        winner.posted_at = duplicate.posted_at;
    }
    winner.is_remote |= duplicate.is_remote;
}

fn fill_str(target: &mut String, source: &str) {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source.to_string();
    }
}

/// Split a deduplicated batch against fingerprints already persisted. A
/// record whose fingerprint exists in history is already represented
/// downstream and is dropped from the persist batch, unless `refresh` passes
/// it through so the sink can update freshness-sensitive fields.
pub fn split_against_history(
    records: &[JobRecord],
    existing: &HashSet<String>,
    refresh: bool,
) -> (Vec<JobRecord>, usize) {
    if refresh || existing.is_empty() {
        return (records.to_vec(), 0);
    }
    let mut fresh = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for record in records {
        if existing.contains(&record.fingerprint) {
            skipped += 1;
        } else {
            fresh.push(record.clone());
        }
    }
    (fresh, skipped)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rand::seq::SliceRandom;

    use super::*;

    fn record(source: &str, source_id: &str, title: &str, company: &str, loc: &str) -> JobRecord {
        JobRecord {
            source: source.to_string(),
            source_id: source_id.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            location: loc.to_string(),
            country: "in".to_string(),
            description: String::new(),
            apply_url: "https://example.com/apply".to_string(),
            salary_min: None,
            salary_max: None,
            salary_currency: None,
            job_type: None,
            is_remote: false,
            posted_at: None,
            fingerprint: fingerprint(title, company, loc),
            raw_payload: None,
        }
    }

    #[test]
    fn cross_provider_fingerprints_collide() {
        let a = fingerprint("Software Engineer", "Acme Inc.", "Bengaluru");
        let b = fingerprint("software engineer", "ACME", "Bengaluru, Karnataka");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_jobs_do_not_collide() {
        let a = fingerprint("Software Engineer", "Acme", "Bengaluru");
        let b = fingerprint("Senior Software Engineer", "Acme", "Bengaluru");
        assert_ne!(a, b);
    }

    #[test]
    fn company_suffixes_strip_repeatedly() {
        let a = fingerprint("Analyst", "Initech Pvt. Ltd.", "Pune");
        let b = fingerprint("Analyst", "initech", "Pune");
        assert_eq!(a, b);
    }

    #[test]
    fn exact_provenance_match_is_a_duplicate() {
        let first = record("adzuna", "42", "Engineer", "Acme", "Pune");
        let second = record("adzuna", "42", "Engineer (Updated)", "Acme Corp", "Pune");
        let outcome = dedupe(vec![first, second]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.merged, 1);
    }

    #[test]
    fn merge_backfills_without_overwriting() {
        let mut early = record("adzuna", "1", "Engineer", "Acme Inc", "Bengaluru");
        early.posted_at = Some(Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());

        let mut late = record("jsearch", "x9", "engineer", "ACME", "Bengaluru, Karnataka");
        late.posted_at = Some(Utc.with_ymd_and_hms(2026, 8, 2, 0, 0, 0).unwrap());
        late.salary_min = Some(900_000.0);
        late.salary_max = Some(1_500_000.0);
        late.salary_currency = Some("INR".to_string());
        late.description = "Full description".to_string();

        let outcome = dedupe(vec![late, early]);
        assert_eq!(outcome.records.len(), 1);

        let winner = &outcome.records[0];
        // Earliest posted_at wins and keeps its provenance.
        assert_eq!(winner.source, "adzuna");
        assert_eq!(winner.source_id, "1");
        // Missing fields adopted from the duplicate.
        assert_eq!(winner.salary_min, Some(900_000.0));
        assert_eq!(winner.salary_currency.as_deref(), Some("INR"));
        assert_eq!(winner.description, "Full description");
        // Non-empty winner fields untouched.
        assert_eq!(winner.title, "Engineer");
    }

    #[test]
    fn result_is_order_independent() {
        let mut records = vec![
            record("adzuna", "1", "Engineer", "Acme Inc", "Bengaluru"),
            record("jsearch", "a", "engineer", "ACME", "Bengaluru, Karnataka"),
            record("jooble", "77", "Data Analyst", "Initech Ltd", "Pune"),
            record("adzuna", "2", "Data Analyst", "Initech", "Pune, Maharashtra"),
            record("jooble", "78", "Product Manager", "Globex", "Mumbai"),
        ];
        let baseline = dedupe(records.clone());

        let mut rng = rand::rng();
        for _ in 0..20 {
            records.shuffle(&mut rng);
            let shuffled = dedupe(records.clone());
            assert_eq!(shuffled.records.len(), baseline.records.len());
            for (a, b) in baseline.records.iter().zip(shuffled.records.iter()) {
                assert_eq!(a.source, b.source);
                assert_eq!(a.source_id, b.source_id);
                assert_eq!(a.salary_min, b.salary_min);
                assert_eq!(a.description, b.description);
            }
        }
    }

    #[test]
    fn history_match_is_excluded_unless_refreshing() {
        let records = vec![
            record("adzuna", "1", "Engineer", "Acme", "Pune"),
            record("adzuna", "2", "Designer", "Globex", "Mumbai"),
        ];
        let mut existing = HashSet::new();
        existing.insert(records[0].fingerprint.clone());

        let (fresh, skipped) = split_against_history(&records, &existing, false);
        assert_eq!(fresh.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(fresh[0].source_id, "2");

        let (all, skipped) = split_against_history(&records, &existing, true);
        assert_eq!(all.len(), 2);
        assert_eq!(skipped, 0);
    }
}
