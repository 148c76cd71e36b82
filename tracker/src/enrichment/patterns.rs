use once_cell::sync::Lazy;
use regex::RegexBuilder;

/// Curated table of well-known organizations and the substrings their
/// network names show up under. Kept as plain data so entries can be added
/// without touching the merge logic.
pub struct CompanyPattern {
    pub name: &'static str,
    pub pattern: &'static str,
}

pub static KNOWN_COMPANIES: &[CompanyPattern] = &[
    CompanyPattern {
        name: "Google",
        pattern: r"google|googleapis",
    },
    CompanyPattern {
        name: "Microsoft",
        pattern: r"microsoft|azure|msn",
    },
    CompanyPattern {
        name: "Amazon",
        pattern: r"amazon|aws",
    },
    CompanyPattern {
        name: "Apple",
        pattern: r"apple",
    },
    CompanyPattern {
        name: "Meta",
        pattern: r"facebook|meta|instagram",
    },
    CompanyPattern {
        name: "Netflix",
        pattern: r"netflix",
    },
    CompanyPattern {
        name: "Salesforce",
        pattern: r"salesforce",
    },
    CompanyPattern {
        name: "LinkedIn",
        pattern: r"linkedin",
    },
    CompanyPattern {
        name: "Twitter",
        pattern: r"twitter|x\.com",
    },
    CompanyPattern {
        name: "Stripe",
        pattern: r"stripe",
    },
    CompanyPattern {
        name: "OpenAI",
        pattern: r"openai",
    },
    CompanyPattern {
        name: "Anthropic",
        pattern: r"anthropic",
    },
];

static COMPILED: Lazy<Vec<(&'static str, regex::Regex)>> = Lazy::new(|| {
    KNOWN_COMPANIES
        .iter()
        .map(|entry| {
            let regex = RegexBuilder::new(entry.pattern)
                .case_insensitive(true)
                .build()
                .expect("known-company pattern must compile");
            (entry.name, regex)
        })
        .collect()
});

/// Match an org string or hostname against the table, returning the
/// canonical company name of the first entry that matches.
pub fn match_company(text: &str) -> Option<&'static str> {
    COMPILED
        .iter()
        .find(|(_, regex)| regex.is_match(text))
        .map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::match_company;

    #[test]
    fn matches_are_case_insensitive() {
        assert_eq!(match_company("AS15169 GOOGLE LLC"), Some("Google"));
        assert_eq!(match_company("crawl-66-249.googlebot.com"), Some("Google"));
    }

    #[test]
    fn matches_return_canonical_names() {
        assert_eq!(match_company("azure-cloud.example"), Some("Microsoft"));
        assert_eq!(match_company("instagram cdn"), Some("Meta"));
    }

    #[test]
    fn unrelated_orgs_do_not_match() {
        assert_eq!(match_company("AS7922 Comcast Cable"), None);
        assert_eq!(match_company(""), None);
    }
}
