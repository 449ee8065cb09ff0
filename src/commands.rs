use std::collections::BTreeMap;

/// Processing commands extracted from a request's query string.
///
/// Names are lowercased; iteration is always in name order, so any
/// serialization of the set is canonical regardless of query order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSet(BTreeMap<String, String>);

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parse a command value, treating unparseable input as absent.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CommandSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = CommandSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Extract the command set from a raw query string.
///
/// Every parameter is kept; processors decide which ones they understand.
/// A malformed query is indistinguishable from one without commands.
pub fn parse_commands(query: Option<&str>) -> CommandSet {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return CommandSet::new();
    };

    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        Err(e) => {
            tracing::debug!("Ignoring malformed query {:?}: {}", query, e);
            CommandSet::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_missing_queries_yield_no_commands() {
        assert!(parse_commands(None).is_empty());
        assert!(parse_commands(Some("")).is_empty());
    }

    #[test]
    fn names_are_lowercased_and_values_kept() {
        let cmds = parse_commands(Some("Width=400&HEIGHT=300&rmode=crop"));
        assert_eq!(cmds.get("width"), Some("400"));
        assert_eq!(cmds.get("height"), Some("300"));
        assert_eq!(cmds.get("rmode"), Some("crop"));
        assert_eq!(cmds.len(), 3);
    }

    #[test]
    fn unknown_parameters_pass_through() {
        let cmds = parse_commands(Some("v=3&foo=bar"));
        assert_eq!(cmds.get("foo"), Some("bar"));
        assert_eq!(cmds.get("v"), Some("3"));
    }

    #[test]
    fn last_repeated_name_wins() {
        let cmds = parse_commands(Some("width=100&width=200"));
        assert_eq!(cmds.parse::<u32>("width"), Some(200));
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let cmds = parse_commands(Some("bgcolor=%23ff0000&name=a+b"));
        assert_eq!(cmds.get("bgcolor"), Some("#ff0000"));
        assert_eq!(cmds.get("name"), Some("a b"));
    }

    #[test]
    fn blank_names_are_dropped() {
        assert!(parse_commands(Some("=5&&")).is_empty());
    }

    #[test]
    fn iteration_order_is_canonical() {
        let a = parse_commands(Some("width=1&height=2"));
        let b = parse_commands(Some("height=2&width=1"));
        assert_eq!(a, b);
        let names: Vec<_> = a.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["height", "width"]);
    }
}
