use depsweep_protocol::SOURCE_EXTENSION;
use regex::Regex;
use std::sync::OnceLock;

// The scan is deliberately textual: the rule engine is the ground truth for
// correctness, reachability only has to avoid analyzing modules nothing
// references. Tolerates CRLF line endings, leading whitespace, and
// qualified names up to ~200 characters.
fn import_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[ \t]*import[ \t]+([A-Za-z][A-Za-z0-9_.]{0,199})").expect("valid regex")
    })
}

/// Every module name imported by `source`, in order of appearance.
pub fn imports_of(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            import_line()
                .captures(line)
                .map(|captures| captures[1].to_string())
        })
        .collect()
}

/// `src/Json/Decode.elm` → `Json.Decode`. Returns `None` for paths outside
/// the recognized source folders.
pub fn module_name_for_path(path: &str) -> Option<String> {
    let rest = path
        .strip_prefix("src/")
        .or_else(|| path.strip_prefix("tests/"))?;
    let rest = rest.strip_suffix(&format!(".{SOURCE_EXTENSION}"))?;
    Some(rest.replace('/', "."))
}

/// `Json.Decode` → `src/Json/Decode.elm`.
pub fn path_for_module(name: &str) -> String {
    format!("src/{}.{SOURCE_EXTENSION}", name.replace('.', "/"))
}
