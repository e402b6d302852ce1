//! In-process full-text matching for stores without a text search engine.
//!
//! Mirrors the Postgres pair used by [`PgChunkStore`](crate::store::PgChunkStore):
//! `websearch_to_tsquery` for parsing and `ts_rank_cd` for ranking.
//!
//! Query grammar:
//! - `solar energy`: both terms must appear (implicit AND)
//! - `"solar energy"`: the words must appear adjacent and in order
//! - `-wind`: documents containing the term are excluded
//! - `solar or wind`: either alternative satisfies the clause
//!
//! Text is lowercased, split on non-alphanumeric characters, stripped of
//! English stopwords and lightly stemmed on both sides.

/// A parsed search query: every positive clause must match, no negated clause may.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQuery {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    /// Token sequences; one token for a plain term, several for a phrase
    alternatives: Vec<Vec<String>>,
    negated: bool,
}

impl Clause {
    /// Fewest tokens any alternative needs.
    fn min_len(&self) -> usize {
        self.alternatives.iter().map(Vec::len).min().unwrap_or(0)
    }
}

enum Token {
    Pattern { tokens: Vec<String>, negated: bool },
    Or,
}

impl TextQuery {
    /// Parse web-search style input. Never fails; unusable input yields an empty query.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut clauses: Vec<Clause> = Vec::new();
        let mut pending_or = false;

        for token in lex(input) {
            match token {
                Token::Or => pending_or = true,
                Token::Pattern { tokens, negated } => {
                    match clauses.last_mut() {
                        Some(last) if pending_or && !negated && !last.negated => {
                            last.alternatives.push(tokens);
                        }
                        _ => clauses.push(Clause {
                            alternatives: vec![tokens],
                            negated,
                        }),
                    }
                    pending_or = false;
                }
            }
        }

        Self { clauses }
    }

    /// `true` when there is nothing positive to look for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.clauses.iter().any(|c| !c.negated)
    }

    /// Cover-density rank of `text`, or `None` when the document does not match.
    ///
    /// Every minimal span ("cover") containing all positive clauses adds
    /// `needed_tokens / span_len`, so adjacent query terms score 1.0 per
    /// cover and scattered ones much less.
    #[must_use]
    pub fn rank(&self, text: &str) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let doc = normalize(text);

        let mut positive: Vec<(&Clause, Vec<(usize, usize)>)> = Vec::new();
        for clause in &self.clauses {
            let spans = occurrences(clause, &doc);
            if clause.negated {
                if !spans.is_empty() {
                    return None;
                }
            } else if spans.is_empty() {
                return None;
            } else {
                positive.push((clause, spans));
            }
        }

        let needed: usize = positive.iter().map(|(c, _)| c.min_len()).sum();
        let spans: Vec<&[(usize, usize)]> = positive.iter().map(|(_, s)| s.as_slice()).collect();
        let score = covers(&spans)
            .into_iter()
            .map(|(start, end)| {
                let len = end - start + 1;
                (needed as f32 / len as f32).min(1.0)
            })
            .sum();
        Some(score)
    }
}

fn lex(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        let mut negated = false;
        if chars[i] == '-' && i + 1 < chars.len() && !chars[i + 1].is_whitespace() {
            negated = true;
            i += 1;
        }

        let (raw, quoted) = if chars[i] == '"' {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end] != '"' {
                end += 1;
            }
            i = (end + 1).min(chars.len());
            (chars[start..end].iter().collect::<String>(), true)
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() && chars[i] != '"' {
                i += 1;
            }
            (chars[start..i].iter().collect::<String>(), false)
        };

        if !quoted && !negated && raw.eq_ignore_ascii_case("or") {
            out.push(Token::Or);
            continue;
        }

        let tokens = normalize(&raw);
        if !tokens.is_empty() {
            out.push(Token::Pattern { tokens, negated });
        }
    }
    out
}

/// Lowercased, stemmed, stopword-free tokens in document order.
#[must_use]
pub fn normalize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_lowercase)
        .filter(|tok| !STOPWORDS.contains(&tok.as_str()))
        .map(|tok| stem(&tok))
        .collect()
}

fn stem(token: &str) -> String {
    let n = token.chars().count();
    if n > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if token.ends_with("sses") {
        return token[..token.len() - 2].to_string();
    }
    if n > 5 && token.ends_with("ing") {
        return token[..token.len() - 3].to_string();
    }
    if n > 4 && token.ends_with("ed") {
        return token[..token.len() - 2].to_string();
    }
    if n > 3 && token.ends_with('s') && !token.ends_with("ss") && !token.ends_with("us") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Inclusive token spans where any alternative of `clause` appears.
fn occurrences(clause: &Clause, doc: &[String]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for start in 0..doc.len() {
        let matched = clause
            .alternatives
            .iter()
            .filter(|alt| !alt.is_empty() && start + alt.len() <= doc.len())
            .filter(|alt| doc[start..start + alt.len()] == alt[..])
            .map(Vec::len)
            .min();
        if let Some(len) = matched {
            spans.push((start, start + len - 1));
        }
    }
    spans
}

/// Minimal covers over per-clause occurrence lists (each sorted by start).
fn covers(clauses: &[&[(usize, usize)]]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut from = 0;
    loop {
        // earliest end by which every clause has occurred
        let mut end = 0;
        for spans in clauses {
            match spans.iter().filter(|(s, _)| *s >= from).map(|(_, e)| *e).min() {
                Some(e) => end = end.max(e),
                None => return out,
            }
        }
        // latest start that still keeps every clause inside [start, end]
        let mut start = usize::MAX;
        for spans in clauses {
            let latest = spans
                .iter()
                .filter(|(s, e)| *s >= from && *e <= end)
                .map(|(s, _)| *s)
                .max()
                .unwrap_or(from);
            start = start.min(latest);
        }
        out.push((start, end));
        from = start + 1;
    }
}

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "other", "our", "ours", "ourselves", "out", "over", "own", "s", "same", "she", "should", "so",
    "some", "such", "t", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];
