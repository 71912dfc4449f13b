/// Tails the event feed file, emitting complete lines as they are written.
///
/// Uses the `notify` crate to detect file modifications, then reads from the
/// last consumed byte offset. Only newline-terminated lines are consumed; a
/// half-written trailing line is left for the next read.
///
/// Truncation handling: when the host starts a new feed it truncates or
/// recreates the file. If the file shrank below our offset we restart from
/// byte 0.
use anyhow::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

pub struct TailerState {
    path:     PathBuf,
    position: u64,
}

impl TailerState {
    fn new(path: PathBuf) -> Self {
        Self { path, position: 0 }
    }

    fn read_new_lines(&mut self, tx: &Sender<String>) -> Result<()> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(_) => return Ok(()), // File doesn't exist yet — wait
        };
        let file_len = metadata.len();

        if file_len < self.position {
            tracing::info!("Feed truncated — restarting from byte 0");
            self.position = 0;
        }

        if file_len == self.position {
            return Ok(());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(file);

        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Feed read error: {}", e);
                    break;
                }
            };
            if buf.last() != Some(&b'\n') {
                break; // partial line — pick it up once it is finished
            }
            self.position += read as u64;

            // Invalid UTF-8 becomes U+FFFD; the parser rejects the line, the
            // offset still moves past it
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if tx.blocking_send(line.to_owned()).is_err() {
                return Ok(()); // Receiver gone — pipeline shutting down
            }
        }
        Ok(())
    }
}

/// Blocking watch loop; run it on a blocking thread.
pub fn run(feed_path: PathBuf, tx: Sender<String>) -> Result<()> {
    tracing::info!("Tailer starting: {:?}", feed_path);

    let watch_dir = feed_path
        .parent()
        .unwrap_or(feed_path.as_path())
        .to_path_buf();

    let (fs_tx, fs_rx) = std_mpsc::channel::<notify::Result<Event>>();

    // notify::Config with a small poll interval as fallback
    let config = notify::Config::default()
        .with_poll_interval(Duration::from_millis(500));

    let mut watcher = RecommendedWatcher::new(fs_tx, config)?;
    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

    let mut state = TailerState::new(feed_path.clone());

    // Initial read — pick up anything written before we started
    if feed_path.exists() {
        state.read_new_lines(&tx)?;
    }

    loop {
        match fs_rx.recv() {
            Ok(Ok(Event { kind: EventKind::Modify(_) | EventKind::Create(_), paths, .. })) => {
                if paths.iter().any(|p| p.file_name() == feed_path.file_name()) {
                    if let Err(e) = state.read_new_lines(&tx) {
                        tracing::warn!("Tailer read error: {}", e);
                    }
                }
            }
            Ok(Ok(_)) => {} // Remove / access events — ignore
            Ok(Err(e)) => tracing::error!("Watcher error: {}", e),
            Err(_) => {
                tracing::warn!("Watcher channel closed — tailer exiting");
                break;
            }
        }
        if tx.is_closed() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::sync::mpsc;

    #[test]
    fn reads_initial_lines() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "0 HIT 1 10 50").unwrap();
        writeln!(f, "1 HIT 1 11 30").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();

        assert_eq!(rx.try_recv().unwrap(), "0 HIT 1 10 50");
        assert_eq!(rx.try_recv().unwrap(), "1 HIT 1 11 30");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn holds_back_partial_line() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "0 HIT 1 10 50\n1 HIT 1 1").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "0 HIT 1 10 50");
        assert!(rx.try_recv().is_err());

        writeln!(f, "1 30").unwrap();
        f.flush().unwrap();
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "1 HIT 1 11 30");
    }

    #[test]
    fn detects_truncation() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "0 HIT 1 10 500000").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();
        let _ = rx.try_recv();

        // New feed: overwrite with shorter content
        let mut f2 = std::fs::File::create(f.path()).unwrap();
        writeln!(f2, "0 RESET").unwrap();
        f2.flush().unwrap();

        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "0 RESET");
    }

    #[test]
    fn invalid_utf8_does_not_stall_the_feed() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"0 HIT 1 10 \xff\n1 HIT 2 10 40\n").unwrap();
        f.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(f.path().to_path_buf());
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "0 HIT 1 10 \u{FFFD}");
        assert_eq!(rx.try_recv().unwrap(), "1 HIT 2 10 40");

        writeln!(f, "2 HIT 3 10 7").unwrap();
        f.flush().unwrap();
        state.read_new_lines(&tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "2 HIT 3 10 7");
        assert_eq!(state.position, std::fs::metadata(f.path()).unwrap().len());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut state = TailerState::new(dir.path().join("feed.log"));
        state.read_new_lines(&tx).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
