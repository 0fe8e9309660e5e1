const CODE_FENCE: &str = "```";
const CONTINUATION: &str = "...";

/// Room kept on wrapped pieces for a leading and a trailing continuation marker.
const MARKER_RESERVE: usize = 6;

/// Split `text` into chunks of roughly `max_len` characters.
///
/// Lines are kept whole where possible; overlong lines are wrapped at spaces
/// and only hard-split when a single word does not fit. Chunk boundaries are
/// marked with `...`, and a fenced code block that spans a boundary is closed
/// at the end of one chunk and reopened at the start of the next. Markers and
/// fences may push a chunk slightly past `max_len`.
pub fn split_long_message(text: &str, max_len: usize) -> Vec<String> {
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let multiline = text.contains('\n');
    let marker = if multiline { "\n..." } else { CONTINUATION };
    let budget = max_len.saturating_sub(MARKER_RESERVE).max(1);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut in_code_block = false;

    for (joiner, piece) in pieces(text, budget) {
        let candidate_len = char_len(&current) + char_len(joiner) + char_len(&piece);

        if !current.is_empty() && candidate_len > max_len {
            if in_code_block {
                current.push('\n');
                current.push_str(CODE_FENCE);
            }
            if !current.ends_with(CONTINUATION) {
                current.push_str(marker);
            }
            chunks.push(std::mem::take(&mut current));

            current.push_str(CONTINUATION);
            if in_code_block {
                current.push('\n');
                current.push_str(CODE_FENCE);
                current.push('\n');
            }
        } else {
            current.push_str(joiner);
        }
        current.push_str(&piece);

        if piece.contains(CODE_FENCE) {
            in_code_block = !in_code_block;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Lines of `text`, each wrapped to `budget`, paired with the separator
/// that joined the piece to its predecessor in the original text.
fn pieces(text: &str, budget: usize) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();

    for (index, line) in text.split('\n').enumerate() {
        let line_joiner = if index == 0 { "" } else { "\n" };
        for (position, (joiner, piece)) in wrap_line(line, budget).into_iter().enumerate() {
            let joiner = if position == 0 { line_joiner } else { joiner };
            out.push((joiner, piece));
        }
    }

    out
}

fn wrap_line(line: &str, budget: usize) -> Vec<(&'static str, String)> {
    if char_len(line) <= budget {
        return vec![("", line.to_string())];
    }

    let mut out = Vec::new();
    let mut current: Option<(&'static str, String)> = None;

    for (index, word) in line.split(' ').enumerate() {
        let joiner = if index == 0 { "" } else { " " };

        if let Some((_, text)) = current.as_mut()
            && char_len(text) + 1 + char_len(word) <= budget
        {
            text.push(' ');
            text.push_str(word);
            continue;
        }

        out.extend(current.take());

        if char_len(word) <= budget {
            current = Some((joiner, word.to_string()));
        } else {
            for (position, part) in hard_split(word, budget).into_iter().enumerate() {
                out.push((if position == 0 { joiner } else { "" }, part));
            }
        }
    }

    out.extend(current);
    out
}

fn hard_split(word: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(size)
        .map(|part| part.iter().collect())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
