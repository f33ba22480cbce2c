//! Extraction of aptsrc metadata from a legacy line's trailing comment.

pub const NAME_TAG: &str = "X-Repolib-Name:";
pub const IDENT_TAG: &str = "X-Repolib-ID:";
pub const IDENT_TAG_ALT: &str = "X-Repolib-Ident:";

/// Metadata recovered from a comment region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations {
    pub name: String,
    pub ident: String,
    pub comments: Vec<String>,
}

impl Annotations {
    /// Free-text comments joined the way they appear in a line.
    pub fn comment(&self) -> String {
        self.comments.join(" # ")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Passthrough,
    CapturingName,
    CapturingIdent,
}

/// Parses the text following a line's first unescaped `#`.
///
/// Tagged values run until the next tag, the next `#` or the end of the text.
/// Everything else is collected as free-text comments, split on `#`.
pub fn extract(region: &str) -> Annotations {
    let mut state = State::Passthrough;
    let mut name: Vec<&str> = Vec::new();
    let mut ident: Vec<&str> = Vec::new();
    let mut comments = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in region.split_whitespace() {
        let bare = token.trim_start_matches('#');
        let hashed = bare.len() != token.len();

        if bare == NAME_TAG {
            finish_comment(&mut current, &mut comments);
            state = State::CapturingName;
            continue;
        }
        if bare == IDENT_TAG || bare == IDENT_TAG_ALT {
            finish_comment(&mut current, &mut comments);
            state = State::CapturingIdent;
            continue;
        }

        if hashed {
            finish_comment(&mut current, &mut comments);
            state = State::Passthrough;
            if bare.is_empty() {
                continue;
            }
        }

        match state {
            State::CapturingName => name.push(bare),
            State::CapturingIdent => ident.push(bare),
            State::Passthrough => current.push(bare),
        }
    }
    finish_comment(&mut current, &mut comments);

    Annotations {
        name: name.join(" "),
        ident: ident.join(" "),
        comments,
    }
}

/// Whether `text` can sit in a comment region and come back unchanged from
/// [`extract`]: no token may open a new comment or look like a tag.
pub fn is_plain(text: &str) -> bool {
    text.split_whitespace().all(|token| {
        !token.starts_with('#') && ![NAME_TAG, IDENT_TAG, IDENT_TAG_ALT].contains(&token)
    })
}

fn finish_comment(current: &mut Vec<&str>, comments: &mut Vec<String>) {
    if !current.is_empty() {
        comments.push(current.join(" "));
        current.clear();
    }
}
