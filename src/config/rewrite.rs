use std::fmt::{Debug, Formatter};
use std::sync::Arc;

const PATH_SEPARATOR: char = '/';

type RewriteFn = dyn Fn(&str) -> String + Send + Sync;

/// Maps a source key to its destination key.
///
/// The pipeline treats the policy as an opaque pure function. The CLI builds
/// one from `--rewrite-strip-segments` and `--rewrite-prefix`; library callers
/// can supply any closure with [`KeyRewriter::new`].
///
/// ```
/// use moveobject_rs::config::rewrite::KeyRewriter;
///
/// let rewriter = KeyRewriter::from_rules(1, Some("archive/".to_string()));
/// assert_eq!(rewriter.rewrite("0/a.txt"), "archive/a.txt");
///
/// let custom = KeyRewriter::new(|key| key.to_uppercase());
/// assert_eq!(custom.rewrite("a.txt"), "A.TXT");
/// ```
#[derive(Clone)]
pub struct KeyRewriter {
    rewrite_fn: Arc<RewriteFn>,
    description: String,
}

impl KeyRewriter {
    pub fn identity() -> Self {
        Self {
            rewrite_fn: Arc::new(|key: &str| key.to_string()),
            description: "identity".to_string(),
        }
    }

    pub fn new<F>(rewrite_fn: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            rewrite_fn: Arc::new(rewrite_fn),
            description: "custom".to_string(),
        }
    }

    /// Drop the first `strip_segments` path segments, then prepend `prefix`.
    ///
    /// A key with no more than `strip_segments` segments keeps its name so the
    /// destination never becomes empty.
    pub fn from_rules(strip_segments: usize, prefix: Option<String>) -> Self {
        if strip_segments == 0 && prefix.as_deref().is_none_or(str::is_empty) {
            return Self::identity();
        }

        let description = format!(
            "strip_segments={strip_segments}, prefix={}",
            prefix.as_deref().unwrap_or("")
        );
        let prefix = prefix.unwrap_or_default();

        Self {
            rewrite_fn: Arc::new(move |key: &str| {
                let stripped = strip_leading_segments(key, strip_segments);
                format!("{prefix}{stripped}")
            }),
            description,
        }
    }

    pub fn rewrite(&self, key: &str) -> String {
        (self.rewrite_fn)(key)
    }
}

impl Default for KeyRewriter {
    fn default() -> Self {
        Self::identity()
    }
}

impl Debug for KeyRewriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRewriter")
            .field("rule", &self.description)
            .finish()
    }
}

fn strip_leading_segments(key: &str, count: usize) -> &str {
    if count == 0 {
        return key;
    }

    match key.match_indices(PATH_SEPARATOR).nth(count - 1) {
        Some((index, _)) if index + 1 < key.len() => &key[index + 1..],
        _ => key,
    }
}
