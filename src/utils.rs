use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid ISO date pattern"));
static US_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})$").expect("valid US date pattern")
});

pub fn format_date_for_api(year: i32, month: u32, day: u32) -> String {
    format!("{}-{:0>2}-{:0>2}", year, month, day)
}

/// Rewrites `MM/DD/YYYY` or `MM/DD/YY` (2000s) to `YYYY-MM-DD`. Input already
/// in `YYYY-MM-DD` is returned as-is. The result must be a real calendar day.
pub fn reformat_draw_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(caps) = ISO_DATE.captures(raw) {
        let (year, month, day) = (
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(raw.to_string());
    }

    let caps = US_DATE.captures(raw)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let mut year: i32 = caps[3].parse().ok()?;
    if caps[3].len() == 2 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)?;
    Some(format_date_for_api(year, month, day))
}
