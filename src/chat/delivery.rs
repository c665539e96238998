//! Splitting replies for transports with a message size limit

/// Split `text` into segments of at most `limit` characters
///
/// Cuts fall after `.`, `!` or `?` followed by whitespace; the whitespace
/// run is replaced by a single space inside a segment. A sentence longer than
/// `limit` is cut at character boundaries. Blank input gives no segments.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        for piece in hard_wrap(sentence, limit) {
            let len = piece.chars().count();
            if current.is_empty() {
                current.push_str(piece);
                current_len = len;
            } else if current_len + 1 + len <= limit {
                current.push(' ');
                current.push_str(piece);
                current_len += 1 + len;
            } else {
                segments.push(std::mem::take(&mut current));
                current.push_str(piece);
                current_len = len;
            }
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            let sentence = text[start..i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i;
        }
        prev = Some(c);
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn hard_wrap(sentence: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = sentence;
    while rest.chars().count() > limit {
        let cut = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        pieces.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}
