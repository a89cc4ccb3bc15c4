use inflector::Inflector;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches one `/segment/{param}` pair in a path template.
/// Captures: 2 = segment, 4 = parameter name.
pub static PATH_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/(\w*)/(\{(\w*)\}))").unwrap());

/// Matches one `/segment` with an optional trailing `/{param}`.
/// Captures: 2 = segment, 4 = parameter name when present.
pub static VIEW_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(/(\w*)(/\{(\w*)\})?)").unwrap());

/// Captures the first path segment, which names the backing collection.
pub static DB_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/(\w*)/?").unwrap());

/// Captures the trailing bare segment of a template (the append target for
/// sub-resource POSTs).
pub static END_OF_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)$").unwrap());

/// One `/segment/{param}` pair extracted from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub segment: String,
    pub param: String,
}

/// Converts an OpenAPI-style template to the mux's concrete form, turning
/// every `/segment/{name}` into `/segment/:name`. Applying it to an already
/// translated path is a no-op.
pub fn translate_path(template: &str) -> String {
    PATH_PARAM_RE.replace_all(template, "/${2}/:${4}").to_string()
}

/// Extracts the `/segment/{param}` pairs of a template, in path order.
pub fn path_pairs(template: &str) -> Vec<PathPair> {
    PATH_PARAM_RE
        .captures_iter(template)
        .map(|cap| PathPair {
            segment: cap[2].to_string(),
            param: cap[4].to_string(),
        })
        .collect()
}

/// Extracts every segment of a template along with its parameter name, when
/// the segment is followed by one.
pub fn view_segments(template: &str) -> Vec<(String, Option<String>)> {
    VIEW_PATH_RE
        .captures_iter(template)
        .map(|cap| {
            (
                cap[2].to_string(),
                cap.get(4).map(|m| m.as_str().to_string()),
            )
        })
        .collect()
}

/// The collection a template addresses: its first path segment.
pub fn collection_name(template: &str) -> Option<String> {
    DB_NAME_RE
        .captures(template)
        .map(|cap| cap[1].to_string())
        .filter(|s| !s.is_empty())
}

/// The singular type name a template addresses: derived from its last
/// segment.
pub fn type_name(template: &str) -> String {
    let segments = view_segments(template);
    segments
        .last()
        .map(|(seg, _)| seg.to_singular())
        .unwrap_or_default()
}

/// The trailing bare segment of a template, if the template ends without a
/// parameter.
pub fn terminal_segment(template: &str) -> Option<String> {
    END_OF_PATH_RE
        .captures(template)
        .map(|cap| cap[1].to_string())
}

/// True when the template's last segment carries a parameter, i.e. the
/// route addresses a single entity rather than a collection.
pub fn is_single_path(template: &str) -> bool {
    template.ends_with('}')
}
