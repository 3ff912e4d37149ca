use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use chrono_tz::Tz;

/// A client's timezone: an IANA zone or a fixed `UTC±hh:mm` offset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClientTimezone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl ClientTimezone {
    pub fn utc() -> Self {
        ClientTimezone::Fixed(Utc.fix())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
            return Some(Self::utc());
        }

        if let Some(prefix) = trimmed.get(..3) {
            if prefix.eq_ignore_ascii_case("utc") || prefix.eq_ignore_ascii_case("gmt") {
                return parse_fixed_offset(&trimmed[3..]).map(ClientTimezone::Fixed);
            }
        }

        trimmed.parse::<Tz>().ok().map(ClientTimezone::Named)
    }

    /// Falls back to UTC for unparseable values stored before validation existed.
    pub fn parse_or_utc(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(Self::utc)
    }

    pub fn local_date(&self, utc_dt: DateTime<Utc>) -> NaiveDate {
        match self {
            ClientTimezone::Named(tz) => utc_dt.with_timezone(tz).date_naive(),
            ClientTimezone::Fixed(offset) => utc_dt.with_timezone(offset).date_naive(),
        }
    }

    pub fn format(&self, utc_dt: DateTime<Utc>) -> String {
        match self {
            ClientTimezone::Named(tz) => utc_dt.with_timezone(tz).format("%a %d %b %Y, %H:%M").to_string(),
            ClientTimezone::Fixed(offset) => {
                utc_dt.with_timezone(offset).format("%a %d %b %Y, %H:%M").to_string()
            }
        }
    }
}

fn parse_fixed_offset(raw: &str) -> Option<FixedOffset> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match trimmed.chars().next()? {
        '+' => (1, &trimmed[1..]),
        '-' => (-1, &trimmed[1..]),
        _ => return None,
    };
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else if rest.len() > 2 {
        let (h, m) = rest.split_at(rest.len() - 2);
        (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?)
    } else {
        (rest.parse::<i32>().ok()?, 0)
    };

    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Canonical form of a timezone for storage, `None` when it cannot be parsed.
pub fn normalize_timezone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let normalized = if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
        "UTC".to_string()
    } else {
        trimmed.to_string()
    };
    ClientTimezone::parse(&normalized).map(|_| normalized)
}
