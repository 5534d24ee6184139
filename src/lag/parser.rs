//! Parsing of Kafka tool output into per-partition lag records.
//!
//! The offset checker and the different releases of `kafka-consumer-groups.sh`
//! print the same seven columns, but with different delimiters and with the
//! consumer group either in the first or in the last column. A
//! [`ParserVariant`] is chosen once per collector from its configuration and
//! maps to a delimiter plus a column layout.

/// Internal topic holding committed offsets, never reported.
pub const CONSUMER_OFFSETS_TOPIC: &str = "__consumer_offsets";
/// Suffix printed by `TopicCommand --list` for topics pending deletion.
pub const MARKED_FOR_DELETION: &str = "marked for deletion";
/// Header marker of the whitespace separated, group-last describe output.
pub const CLIENT_ID_HEADER: &str = "CLIENT-ID";

const FIELD_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserVariant {
    /// `ConsumerOffsetChecker`: space separated, group first.
    LegacyA,
    /// 0.9+ `--describe`: comma-space separated, group first.
    LegacyB,
    /// Space separated, group last. Header detected by `CLIENT-ID`.
    NewConsumerA,
    /// Space separated, group first, from `kafka-consumer-groups.sh`.
    NewConsumerB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Whitespace,
    CommaSpace,
}

/// Column positions of the seven fields.
#[derive(Debug, Clone, Copy)]
struct Layout {
    group: usize,
    topic: usize,
    partition: usize,
    consumer_offset: usize,
    broker_offset: usize,
    lag: usize,
    owner: usize,
}

const GROUP_FIRST: Layout = Layout {
    group: 0,
    topic: 1,
    partition: 2,
    consumer_offset: 3,
    broker_offset: 4,
    lag: 5,
    owner: 6,
};

const GROUP_LAST: Layout = Layout {
    topic: 0,
    partition: 1,
    consumer_offset: 2,
    broker_offset: 3,
    lag: 4,
    owner: 5,
    group: 6,
};

impl ParserVariant {
    const fn delimiter(self) -> Delimiter {
        match self {
            Self::LegacyB => Delimiter::CommaSpace,
            Self::LegacyA | Self::NewConsumerA | Self::NewConsumerB => Delimiter::Whitespace,
        }
    }

    const fn layout(self) -> Layout {
        match self {
            Self::NewConsumerA => GROUP_LAST,
            Self::LegacyA | Self::LegacyB | Self::NewConsumerB => GROUP_FIRST,
        }
    }

    /// Whether the header is always the first line of the output. The
    /// group-last variant may print notices before its header, so the header
    /// is found by content instead.
    const fn header_on_first_line(self) -> bool {
        !matches!(self, Self::NewConsumerA)
    }

    fn tokenize(self, line: &str) -> Vec<&str> {
        let line = line.trim();
        match self.delimiter() {
            Delimiter::Whitespace => line.split_whitespace().collect(),
            Delimiter::CommaSpace => line.split(", ").filter(|t| !t.is_empty()).collect(),
        }
    }
}

/// One partition row of tool output. Built once per line, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerLagRecord {
    pub cluster_name: Option<String>,
    pub consumer_group: String,
    pub topic: String,
    pub partition: String,
    /// `None` when the tool printed a placeholder such as `-` or `unknown`.
    pub consumer_offset: Option<i64>,
    pub broker_offset: Option<i64>,
    pub lag: i64,
    pub owner: String,
}

/// Parse a single line. Returns `None` for anything that is not a complete,
/// seven-column row with a numeric lag.
pub fn parse_line(
    variant: ParserVariant,
    line: &str,
    cluster_name: Option<&str>,
) -> Option<ConsumerLagRecord> {
    let tokens = variant.tokenize(line);
    if tokens.len() != FIELD_COUNT {
        return None;
    }

    let layout = variant.layout();
    let lag = tokens[layout.lag].parse::<i64>().ok()?;

    Some(ConsumerLagRecord {
        cluster_name: cluster_name
            .filter(|c| !c.is_empty())
            .map(ToString::to_string),
        consumer_group: tokens[layout.group].to_string(),
        topic: tokens[layout.topic].to_string(),
        partition: tokens[layout.partition].to_string(),
        consumer_offset: tokens[layout.consumer_offset].parse().ok(),
        broker_offset: tokens[layout.broker_offset].parse().ok(),
        lag,
        owner: tokens[layout.owner].to_string(),
    })
}

/// Result of parsing a whole command output.
#[derive(Debug, Clone, Default)]
pub struct ParsedOutput {
    pub records: Vec<ConsumerLagRecord>,
    /// Non-blank, non-header lines that did not yield a record.
    pub skipped_lines: usize,
}

/// Parse the stdout of a describe / offset checker invocation, dropping the
/// header first.
pub fn parse_output(variant: ParserVariant, raw: &str, cluster_name: Option<&str>) -> ParsedOutput {
    let skip = usize::from(variant.header_on_first_line());
    let mut parsed = ParsedOutput::default();

    for line in raw.lines().skip(skip) {
        if line.trim().is_empty() {
            continue;
        }
        if !variant.header_on_first_line() && line.contains(CLIENT_ID_HEADER) {
            continue;
        }
        match parse_line(variant, line, cluster_name) {
            Some(record) => parsed.records.push(record),
            None => parsed.skipped_lines += 1,
        }
    }

    parsed
}

/// Parse `TopicCommand --list` output into topic names.
pub fn parse_topic_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains(CONSUMER_OFFSETS_TOPIC) && !line.contains(MARKED_FOR_DELETION))
        .map(ToString::to_string)
        .collect()
}

/// Parse `kafka-consumer-groups.sh --list` output into group ids.
pub fn parse_group_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
