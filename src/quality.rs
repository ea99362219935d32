use regex::Regex;

/// Verdict of the pre-evaluation content check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Admissible,
    Excluded { reason: String },
}

impl Classification {
    pub fn is_admissible(&self) -> bool {
        matches!(self, Classification::Admissible)
    }
}

/// Flags articles whose body is mostly a wall of links back to the platform
/// itself (follow-me spam), which the scoring oracle rates uselessly high.
pub struct QualityFilter {
    article_link: Regex,
    threshold: usize,
}

impl QualityFilter {
    pub fn new(platform_host: &str, threshold: usize) -> Self {
        let article_link = Regex::new(&format!(
            r"(?i)https?://{}/[\w\-]+/n/[\w\-]+",
            regex::escape(platform_host)
        ))
        .expect("invalid platform host pattern");

        Self {
            article_link,
            threshold,
        }
    }

    /// Classify an article body. An empty or missing body is admissible:
    /// there is nothing to count, and the evaluation step sees the same
    /// emptiness anyway.
    pub fn classify(&self, body: &str) -> Classification {
        if body.is_empty() {
            return Classification::Admissible;
        }

        let link_count = self.article_link.find_iter(body).count();
        if link_count >= self.threshold {
            return Classification::Excluded {
                reason: format!(
                    "body contains {link_count} same-platform article links (limit {})",
                    self.threshold
                ),
            };
        }

        Classification::Admissible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> QualityFilter {
        QualityFilter::new("note.com", 4)
    }

    #[test]
    fn empty_body_is_admissible() {
        assert!(filter().classify("").is_admissible());
    }

    #[test]
    fn few_platform_links_are_fine() {
        let body = "Great piece. See https://note.com/alice/n/n1 and \
                    https://note.com/bob/n/n2 plus https://example.com/x.";
        assert!(filter().classify(body).is_admissible());
    }

    #[test]
    fn four_platform_links_exclude() {
        let body = (1..=4)
            .map(|i| format!("https://note.com/user{i}/n/key{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        match filter().classify(&body) {
            Classification::Excluded { reason } => {
                assert!(reason.contains("4 same-platform article links"));
            }
            Classification::Admissible => panic!("expected exclusion"),
        }
    }

    #[test]
    fn foreign_links_do_not_count() {
        let body = (1..=10)
            .map(|i| format!("https://other.example/user{i}/n/key{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(filter().classify(&body).is_admissible());
    }

    #[test]
    fn host_is_escaped_in_the_pattern() {
        // "note.com" must not match "noteXcom"
        let body = (1..=5)
            .map(|i| format!("https://noteXcom/user{i}/n/key{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(filter().classify(&body).is_admissible());
    }
}
