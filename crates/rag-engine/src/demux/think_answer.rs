//! Think/Answer Demultiplexer (§4.11): a stateful stream filter splitting an
//! LM's raw token stream into a `think` stream and an `answer` stream,
//! delimited by literal `<think>`/`</think>` tags that may straddle chunk
//! boundaries.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Answer,
    Think,
}

/// Output of a single `push`/`flush` call: text to append to each stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemuxOutput {
    pub think: String,
    pub answer: String,
}

impl DemuxOutput {
    fn emit(mode: Mode, text: &str) -> Self {
        match mode {
            Mode::Think => Self { think: text.to_string(), answer: String::new() },
            Mode::Answer => Self { think: String::new(), answer: text.to_string() },
        }
    }

    fn merge(&mut self, other: DemuxOutput) {
        self.think.push_str(&other.think);
        self.answer.push_str(&other.answer);
    }
}

pub struct ThinkAnswerDemux {
    mode: Mode,
    buf: String,
}

impl Default for ThinkAnswerDemux {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkAnswerDemux {
    pub fn new() -> Self {
        Self { mode: Mode::Answer, buf: String::new() }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Appends `chunk` to the internal buffer and emits everything that can
    /// safely be released without risking a delimiter match straddling the
    /// next chunk.
    pub fn push(&mut self, chunk: &str) -> DemuxOutput {
        self.buf.push_str(chunk);
        let mut out = DemuxOutput::default();

        loop {
            let delim = match self.mode {
                Mode::Answer => OPEN,
                Mode::Think => CLOSE,
            };

            match self.buf.find(delim) {
                Some(idx) => {
                    let prefix = self.buf[..idx].to_string();
                    out.merge(DemuxOutput::emit(self.mode, &prefix));
                    self.buf = self.buf[idx + delim.len()..].to_string();
                    self.mode = match self.mode {
                        Mode::Answer => Mode::Think,
                        Mode::Think => Mode::Answer,
                    };
                }
                None => {
                    let hold = delim.len().saturating_sub(1);
                    if self.buf.len() > hold {
                        let split_at = safe_split_point(&self.buf, self.buf.len() - hold);
                        let release = self.buf[..split_at].to_string();
                        out.merge(DemuxOutput::emit(self.mode, &release));
                        self.buf = self.buf[split_at..].to_string();
                    }
                    break;
                }
            }
        }

        out
    }

    /// Releases whatever remains in the buffer into the current mode's
    /// stream. Must be called once the upstream LM stream ends; skipping it
    /// silently truncates output.
    pub fn flush(mut self) -> DemuxOutput {
        let remainder = std::mem::take(&mut self.buf);
        DemuxOutput::emit(self.mode, &remainder)
    }
}

/// Delimiters are pure ASCII, so any byte offset that is not itself inside
/// a multi-byte UTF-8 sequence is a safe split point; walk backward from
/// the target offset to the nearest char boundary.
fn safe_split_point(s: &str, target: usize) -> usize {
    let mut idx = target.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(chunks: &[&str]) -> DemuxOutput {
        let mut demux = ThinkAnswerDemux::new();
        let mut out = DemuxOutput::default();
        for chunk in chunks {
            out.merge(demux.push(chunk));
        }
        out.merge(demux.flush());
        out
    }

    #[test]
    fn plain_answer_with_no_think_tags() {
        let out = drive(&["hello world"]);
        assert_eq!(out.answer, "hello world");
        assert!(out.think.is_empty());
    }

    #[test]
    fn single_chunk_think_block() {
        let out = drive(&["before <think>reasoning</think> after"]);
        assert_eq!(out.answer, "before  after");
        assert_eq!(out.think, "reasoning");
    }

    #[test]
    fn delimiter_straddles_chunk_boundary() {
        // matches the scenario from the external interface spec's end-to-end suite
        let out = drive(&["a<thi", "nk>b</", "think>c"]);
        assert_eq!(out.think, "b");
        assert_eq!(out.answer, "ac");
    }

    #[test]
    fn unterminated_think_block_flushes_into_think_stream() {
        let out = drive(&["answer part <think>unterminated reasoning"]);
        assert_eq!(out.answer, "answer part ");
        assert_eq!(out.think, "unterminated reasoning");
    }

    #[test]
    fn empty_chunks_are_harmless() {
        let out = drive(&["", "<think>", "", "x", "</think>", ""]);
        assert_eq!(out.think, "x");
        assert!(out.answer.is_empty());
    }

    #[test]
    fn multiple_think_blocks_in_sequence() {
        let out = drive(&["a<think>t1</think>b<think>t2</think>c"]);
        assert_eq!(out.answer, "abc");
        assert_eq!(out.think, "t1t2");
    }

    fn reference_split(input: &str) -> DemuxOutput {
        drive(&[input])
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn random_chunk_splittings_match_single_chunk_result(
            splits in proptest::collection::vec(1usize..6, 0..8),
        ) {
            let input = "intro <think>hidden reasoning spanning several words</think> visible conclusion <think>more</think> done";
            let reference = reference_split(input);

            let mut pieces = Vec::new();
            let mut rest = input;
            for n in &splits {
                if rest.is_empty() {
                    break;
                }
                let at = safe_split_point(rest, (*n).min(rest.len()));
                let at = at.max(1.min(rest.len()));
                let (head, tail) = rest.split_at(at);
                pieces.push(head);
                rest = tail;
            }
            if !rest.is_empty() {
                pieces.push(rest);
            }

            let chunk_refs: Vec<&str> = pieces;
            let actual = drive(&chunk_refs);
            prop_assert_eq!(actual, reference);
        }
    }
}
