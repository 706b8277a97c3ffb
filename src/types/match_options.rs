use inetnum::addr::Prefix;

//------------ MatchOptions / MatchType -------------------------------------

/// Options for the `match_prefix` method
///
/// The `MatchOptions` struct is used to specify the options for the
/// [`match_prefix`](crate::Table::match_prefix) method on the table.
///
/// Note that the `match_type` field only applies to the `prefix` and
/// `value` fields of the returned [QueryResult]; the less- and
/// more-specifics collections are filled independently of it.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// The requested [MatchType]
    pub match_type: MatchType,
    /// Whether to include all less-specific prefixes in the query result
    pub include_less_specifics: bool,
    /// Whether to include all more-specific prefixes in the query result
    pub include_more_specifics: bool,
}

/// Option to set the match type for a prefix match. Type can be Exact,
/// Longest, or Empty.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MatchType {
    /// Only return the requested prefix and its value, if the requested
    /// prefix is actually stored in the table.
    ExactMatch,
    /// Return the longest stored prefix that covers the requested prefix
    /// (if any). May match the prefix exactly.
    LongestMatch,
    /// Do not look for a matching prefix at all; only the requested
    /// less- and/or more-specifics are collected.
    EmptyMatch,
}

impl MatchType {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::EmptyMatch)
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            MatchType::ExactMatch => write!(f, "exact-match"),
            MatchType::LongestMatch => write!(f, "longest-match"),
            MatchType::EmptyMatch => write!(f, "empty-match"),
        }
    }
}

//------------ QueryResult ---------------------------------------------------

/// The result of a [`match_prefix`](crate::Table::match_prefix) query.
#[derive(Clone, Debug)]
pub struct QueryResult<V> {
    /// The matched prefix, if any.
    pub prefix: Option<Prefix>,
    /// The value stored for the matched prefix.
    pub value: Option<V>,
    /// All stored prefixes covering the requested prefix, excluding the
    /// match itself. Empty unless requested through [MatchOptions].
    pub less_specifics: Vec<(Prefix, V)>,
    /// All stored prefixes covered by the requested prefix, excluding the
    /// match itself. Empty unless requested through [MatchOptions].
    pub more_specifics: Vec<(Prefix, V)>,
}

impl<V: std::fmt::Display> std::fmt::Display for QueryResult<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let pfx_str = match self.prefix {
            Some(pfx) => format!("{}", pfx),
            None => "none".to_string(),
        };
        let value_str = match &self.value {
            Some(value) => format!("{}", value),
            None => "none".to_string(),
        };
        writeln!(f, "prefix: {}", pfx_str)?;
        writeln!(f, "value: {}", value_str)?;
        writeln!(f, "less-specifics: {}", self.less_specifics.len())?;
        writeln!(f, "more-specifics: {}", self.more_specifics.len())
    }
}
