//! The fixed company roster and its name-alias table.
//!
//! The alias table drives company detection in free text: entity
//! co-occurrence edges in the passage graph and company mentions in the
//! query router both match against it.

/// Aliases for one tracked company.
#[derive(Debug, Clone, Copy)]
pub struct CompanyAliases {
    /// Ticker symbol
    pub ticker: &'static str,
    /// Names the company is referred to by in filing text
    pub names: &'static [&'static str],
}

/// Hand-curated ticker -> company-name aliases for the tracked roster.
pub const COMPANY_ALIASES: &[CompanyAliases] = &[
    CompanyAliases { ticker: "AAPL", names: &["Apple"] },
    CompanyAliases { ticker: "AMD", names: &["AMD", "Advanced Micro Devices"] },
    CompanyAliases { ticker: "AMZN", names: &["Amazon"] },
    CompanyAliases { ticker: "BAC", names: &["Bank of America"] },
    CompanyAliases { ticker: "BRKA", names: &["Berkshire Hathaway", "Berkshire"] },
    CompanyAliases { ticker: "CSCO", names: &["Cisco"] },
    CompanyAliases { ticker: "DIS", names: &["Disney", "Walt Disney"] },
    CompanyAliases { ticker: "GOOG", names: &["Google", "Alphabet"] },
    CompanyAliases { ticker: "GS", names: &["Goldman Sachs"] },
    CompanyAliases { ticker: "HD", names: &["Home Depot"] },
    CompanyAliases { ticker: "IBM", names: &["IBM"] },
    CompanyAliases { ticker: "INTC", names: &["Intel"] },
    CompanyAliases { ticker: "JPM", names: &["JPMorgan", "JP Morgan"] },
    CompanyAliases { ticker: "META", names: &["Meta", "Facebook"] },
    CompanyAliases { ticker: "MSFT", names: &["Microsoft"] },
    CompanyAliases { ticker: "NVDA", names: &["NVIDIA"] },
    CompanyAliases { ticker: "ORCL", names: &["Oracle"] },
    CompanyAliases { ticker: "TSLA", names: &["Tesla"] },
    CompanyAliases { ticker: "WFC", names: &["Wells Fargo"] },
    CompanyAliases { ticker: "WMT", names: &["Walmart"] },
];

/// Tickers mentioned in `text`, matched case-insensitively on whole names
/// or the bare ticker.
pub fn detect_tickers(text: &str) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    let mut found = Vec::new();
    for entry in COMPANY_ALIASES {
        if contains_word_case_sensitive(text, entry.ticker) {
            found.push(entry.ticker);
            continue;
        }
        for name in entry.names {
            if contains_word(&lower, &name.to_lowercase()) {
                found.push(entry.ticker);
                break;
            }
        }
    }
    found
}

/// Aliases for a ticker, when the roster tracks it.
pub fn aliases_for(ticker: &str) -> Option<&'static CompanyAliases> {
    COMPANY_ALIASES.iter().find(|e| e.ticker == ticker)
}

// Whole-word containment without a regex: the needle must not be flanked by
// alphanumerics in the haystack.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let abs = start + pos;
        let before_ok = abs == 0
            || !haystack[..abs]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after = abs + needle.len();
        let after_ok = after >= haystack.len()
            || !haystack[after..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = abs + needle.len();
    }
    false
}

// Tickers stay case-sensitive: "HD" should match, "hd" inside a word should not.
fn contains_word_case_sensitive(haystack: &str, needle: &str) -> bool {
    contains_word(haystack, needle)
}
