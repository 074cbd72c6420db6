//! Weighted path similarity
//!
//! Scores how likely a backend route and a frontend request path refer to
//! the same endpoint. Paths are normalized (parameter syntaxes unified,
//! recognised API prefixes dropped), then five weighted components are
//! combined; identical normalized paths short-circuit to 1.0.

/// The unified parameter placeholder
pub const PARAM: &str = ":param";

/// Prefix segments dropped during normalization
const COMMON_PREFIXES: &[&str] = &[
    "api", "rest", "graphql", "public", "private", "internal", "external",
];

/// Weights of the five similarity components
const W_SEGMENT_NAMES: f64 = 0.25;
const W_SEGMENT_COUNT: f64 = 0.10;
const W_SUFFIX: f64 = 0.30;
const W_RESOURCE: f64 = 0.25;
const W_PARAM_POSITION: f64 = 0.10;

/// Normalizes a path into segments: parameter syntaxes (`{x}`, `<x>`,
/// `${x}`, `:x`) and purely numeric literals become [`PARAM`], everything
/// is lowercased, slashes collapse, and a recognised API prefix at the
/// head is dropped.
pub fn normalize_path(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            let s = s.trim();
            let is_param = s.starts_with(':')
                || (s.starts_with('{') && s.ends_with('}'))
                || (s.starts_with('<') && s.ends_with('>'))
                || s.starts_with("${")
                || (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()));
            if is_param {
                PARAM.to_string()
            } else {
                s.to_lowercase()
            }
        })
        .collect();

    // Drop the recognised common prefix run at the head: /api, /v1, ...
    let mut drop = 0;
    for segment in &segments {
        let is_version = segment.len() > 1
            && segment.starts_with('v')
            && segment[1..].chars().all(|c| c.is_ascii_digit());
        if COMMON_PREFIXES.contains(&segment.as_str()) || is_version {
            drop += 1;
        } else {
            break;
        }
    }
    segments.drain(..drop);
    segments
}

/// Computes the similarity of a backend route and a frontend path
pub fn path_similarity(backend: &str, frontend: &str) -> f64 {
    let b = normalize_path(backend);
    let f = normalize_path(frontend);
    if b.is_empty() || f.is_empty() {
        return 0.0;
    }
    if b == f {
        return 1.0;
    }

    let score = W_SEGMENT_NAMES * segment_names_jaccard(&b, &f)
        + W_SEGMENT_COUNT * segment_count_proximity(&b, &f)
        + W_SUFFIX * suffix_match(&b, &f)
        + W_RESOURCE * resource_name_score(&b, &f)
        + W_PARAM_POSITION * param_position_score(&b, &f);

    let mut score = score;
    // Short backend paths are easy to mismatch; penalise unless the
    // resource names agree.
    if b.len() == 1 && resource_name_score(&b, &f) < 0.8 {
        score *= 0.5;
        if b[0] == PARAM {
            score *= 0.3;
        }
    }
    score
}

fn meaningful<'a>(segments: &'a [String]) -> Vec<&'a str> {
    segments
        .iter()
        .filter(|s| s.as_str() != PARAM)
        .map(String::as_str)
        .collect()
}

fn segment_names_jaccard(b: &[String], f: &[String]) -> f64 {
    let bs: std::collections::HashSet<&str> = meaningful(b).into_iter().collect();
    let fs: std::collections::HashSet<&str> = meaningful(f).into_iter().collect();
    if bs.is_empty() && fs.is_empty() {
        return 1.0;
    }
    let intersection = bs.intersection(&fs).count();
    let union = bs.union(&fs).count();
    intersection as f64 / union.max(1) as f64
}

fn segment_count_proximity(b: &[String], f: &[String]) -> f64 {
    let delta = (b.len() as i64 - f.len() as i64).unsigned_abs() as f64;
    let max = b.len().max(f.len()) as f64;
    1.0 - delta / max
}

/// Aligns the backend path to the end of the frontend path and counts
/// segment agreements; a parameter aligned against anything scores 0.7.
fn suffix_match(b: &[String], f: &[String]) -> f64 {
    let take = b.len().min(f.len());
    let b_tail = &b[b.len() - take..];
    let f_tail = &f[f.len() - take..];
    let mut score = 0.0;
    for (bseg, fseg) in b_tail.iter().zip(f_tail) {
        if bseg == fseg {
            score += 1.0;
        } else if bseg == PARAM || fseg == PARAM {
            score += 0.7;
        }
    }
    score / b.len() as f64
}

fn resource_name_score(b: &[String], f: &[String]) -> f64 {
    let b_res = b.iter().rev().find(|s| s.as_str() != PARAM);
    let f_res = f.iter().rev().find(|s| s.as_str() != PARAM);
    match (b_res, f_res) {
        (Some(br), Some(fr)) if br == fr => 1.0,
        (Some(br), Some(fr)) if br.starts_with(fr.as_str()) || fr.starts_with(br.as_str()) => 0.8,
        _ => 0.0,
    }
}

/// Parameter positions normalized into [0, 1]; mutual matches within 0.2
/// count.
fn param_position_score(b: &[String], f: &[String]) -> f64 {
    let positions = |segments: &[String]| -> Vec<f64> {
        let last = (segments.len() - 1).max(1) as f64;
        segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.as_str() == PARAM)
            .map(|(i, _)| i as f64 / last)
            .collect()
    };
    let bp = positions(b);
    let fp = positions(f);
    if bp.is_empty() && fp.is_empty() {
        return 1.0;
    }
    if bp.is_empty() || fp.is_empty() {
        return 0.0;
    }
    let matched = bp
        .iter()
        .filter(|b_pos| fp.iter().any(|f_pos| (*b_pos - f_pos).abs() <= 0.2))
        .count();
    matched as f64 / bp.len().max(fp.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unifies_param_syntaxes() {
        assert_eq!(normalize_path("/users/:id"), vec!["users", PARAM]);
        assert_eq!(normalize_path("/users/{id}"), vec!["users", PARAM]);
        assert_eq!(normalize_path("/users/<id>"), vec!["users", PARAM]);
        assert_eq!(normalize_path("/users/${id}"), vec!["users", PARAM]);
        assert_eq!(normalize_path("/users/42"), vec!["users", PARAM]);
    }

    #[test]
    fn test_normalize_drops_common_prefixes() {
        assert_eq!(normalize_path("/api/v1/users"), vec!["users"]);
        assert_eq!(normalize_path("/internal/orders"), vec!["orders"]);
        assert_eq!(normalize_path("//users//"), vec!["users"]);
        // a version segment mid-path is not a prefix
        assert_eq!(normalize_path("/users/v2"), vec!["users", "v2"]);
    }

    #[test]
    fn test_identical_paths_short_circuit() {
        assert!((path_similarity("/api/v1/users/:id", "/users/42") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_related_paths_score_high() {
        let score = path_similarity("/api/users/:id/orders", "/users/7/orders");
        assert!(score > 0.9, "got {score}");
    }

    #[test]
    fn test_unrelated_paths_score_low() {
        let score = path_similarity("/api/users/:id", "/payments/refunds");
        assert!(score < 0.4, "got {score}");
    }

    #[test]
    fn test_single_segment_penalty() {
        let score = path_similarity("/health", "/users/42");
        assert!(score < 0.3, "got {score}");
    }

    #[test]
    fn test_bare_param_penalty() {
        let score = path_similarity("/:id", "/users/42");
        let unpenalized = path_similarity("/users", "/users");
        assert!(score < unpenalized * 0.2, "got {score}");
    }
}
