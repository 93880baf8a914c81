/// Separates several command invocations on one console line
pub const CHAIN_DELIMITER: &str = "&&";
/// Ends the session as soon as it is reached
pub const TERMINATOR: &str = "exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub token: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainedLine {
    segments: Vec<Segment>,
}

impl ChainedLine {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }
}

/// Splits a console line into its chained segments, in order
///
/// Segments without any word (`a && && b`, a trailing `&&`) are skipped.
pub fn parse_line(text: &str) -> ChainedLine {
    let segments = text
        .split(CHAIN_DELIMITER)
        .filter_map(|segment| {
            let mut words = segment.split_whitespace();
            let token = words.next()?;
            Some(Segment {
                token: token.to_string(),
                args: words.map(str::to_string).collect(),
            })
        })
        .collect();
    ChainedLine { segments }
}
