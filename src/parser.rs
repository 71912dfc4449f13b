/// Parses raw event-feed lines into typed `MeterEvent`s.
///
/// Feed format, one event per line, whitespace separated:
///
///   <timestamp_ms> HIT   <attacker_id> <target_id> <amount>
///   <timestamp_ms> HEAL  <healer_id>   <target_id> <amount>
///   <timestamp_ms> RESET
///
/// Keywords are case-insensitive and `ZONE` is accepted for `RESET`.
/// Everything after a `#` is a comment. Bad lines are skipped by the
/// pipeline task; `parse_line` reports why so tests can check it.
use crate::{
    error::FeedError,
    hit::{RawHeal, RawHit},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeterEvent {
    Hit   { timestamp_ms: u64, hit: RawHit },
    Heal  { timestamp_ms: u64, heal: RawHeal },
    Reset { timestamp_ms: u64 },
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn number<T: std::str::FromStr>(field: &str) -> Result<T, FeedError> {
    field.parse().map_err(|_| FeedError::Number(field.to_owned()))
}

fn expect_args(keyword: &'static str, args: &[&str], expected: usize) -> Result<(), FeedError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(FeedError::Arity { keyword, expected, got: args.len() })
    }
}

/// Parse one line. `Ok(None)` for blank and comment-only lines.
pub fn parse_line(raw: &str) -> Result<Option<MeterEvent>, FeedError> {
    let line = raw.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let (ts, rest) = fields.split_first().ok_or(FeedError::Empty)?;
    let timestamp_ms: u64 = ts.parse().map_err(|_| FeedError::Timestamp((*ts).to_owned()))?;
    let (keyword, args) = rest.split_first().ok_or(FeedError::Empty)?;

    let event = match keyword.to_ascii_uppercase().as_str() {
        "HIT" => {
            expect_args("HIT", args, 3)?;
            MeterEvent::Hit {
                timestamp_ms,
                hit: RawHit::new(number(args[0])?, number(args[1])?, number(args[2])?),
            }
        }
        "HEAL" => {
            expect_args("HEAL", args, 3)?;
            MeterEvent::Heal {
                timestamp_ms,
                heal: RawHeal {
                    healer_id: number(args[0])?,
                    target_id: number(args[1])?,
                    amount:    number(args[2])?,
                },
            }
        }
        "RESET" | "ZONE" => {
            expect_args("RESET", args, 0)?;
            MeterEvent::Reset { timestamp_ms }
        }
        other => return Err(FeedError::Keyword(other.to_owned())),
    };
    Ok(Some(event))
}

/// Async pipeline task: receive raw lines, parse, forward typed events.
pub async fn run(mut rx: Receiver<String>, tx: Sender<MeterEvent>) -> Result<()> {
    while let Some(line) = rx.recv().await {
        match parse_line(&line) {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Skipping feed line {:?}: {}", line, e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn parses_hit() {
        let e = parse_line("1500 HIT 1 10 50").unwrap().expect("should parse");
        assert_eq!(e, MeterEvent::Hit { timestamp_ms: 1500, hit: RawHit::new(1, 10, 50) });
    }

    #[test]
    fn keeps_negative_amount_for_the_core_to_drop() {
        let e = parse_line("0 hit 0 9 -5").unwrap().unwrap();
        assert_eq!(e, MeterEvent::Hit { timestamp_ms: 0, hit: RawHit::new(0, 9, -5) });
    }

    #[test]
    fn parses_heal_and_reset() {
        let heal = parse_line("20 HEAL 2 1 300").unwrap().unwrap();
        assert!(matches!(heal, MeterEvent::Heal { heal: RawHeal { healer_id: 2, .. }, .. }));

        assert_eq!(parse_line("30 RESET").unwrap(), Some(MeterEvent::Reset { timestamp_ms: 30 }));
        assert_eq!(parse_line("31 zone").unwrap(), Some(MeterEvent::Reset { timestamp_ms: 31 }));
    }

    #[test]
    fn skips_blank_and_comments() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   # just a note").unwrap(), None);
        assert!(parse_line("5 HIT 1 2 3 # trailing").unwrap().is_some());
    }

    #[test]
    fn reports_bad_lines() {
        assert_eq!(parse_line("abc HIT 1 2 3"), Err(FeedError::Timestamp("abc".into())));
        assert_eq!(parse_line("1 SMASH 1 2 3"), Err(FeedError::Keyword("SMASH".into())));
        assert_eq!(
            parse_line("1 HIT 1 2"),
            Err(FeedError::Arity { keyword: "HIT", expected: 3, got: 2 })
        );
        assert_eq!(parse_line("1 HIT 1 two 3"), Err(FeedError::Number("two".into())));
        assert_eq!(parse_line("12"), Err(FeedError::Empty));
        // Undecodable bytes reach the parser as U+FFFD
        assert_eq!(parse_line("0 HIT 1 10 \u{FFFD}"), Err(FeedError::Number("\u{FFFD}".into())));
    }

    #[tokio::test]
    async fn pipeline_forwards_only_events() {
        let (line_tx, line_rx) = mpsc::channel(8);
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let task = tokio::spawn(run(line_rx, event_tx));

        for line in ["1 HIT 1 10 5", "garbage", "# note", "2 RESET"] {
            line_tx.send(line.to_owned()).await.unwrap();
        }
        drop(line_tx);
        task.await.unwrap().unwrap();

        assert!(matches!(event_rx.recv().await, Some(MeterEvent::Hit { .. })));
        assert!(matches!(event_rx.recv().await, Some(MeterEvent::Reset { .. })));
        assert!(event_rx.recv().await.is_none());
    }
}
