//! Bounded transcript of child output.

use std::collections::VecDeque;

/// Line buffer holding at most `capacity` bytes; the oldest lines go first.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    bytes: usize,
    capacity: usize,
    evicted_lines: u64,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            capacity,
            evicted_lines: 0,
        }
    }

    /// Append one line (without its terminator).
    pub fn push(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line);

        while self.bytes > self.capacity {
            match self.lines.pop_front() {
                Some(old) => {
                    self.bytes -= old.len() + 1;
                    self.evicted_lines += 1;
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Bytes currently retained, counting one terminator per line.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn evicted_lines(&self) -> u64 {
        self.evicted_lines
    }

    /// Last `n` lines joined with newlines.
    pub fn tail(&self, n: usize) -> String {
        let skip = self.lines.len().saturating_sub(n);
        self.lines
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whole retained transcript.
    pub fn contents(&self) -> String {
        self.tail(self.lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retains_lines_under_capacity() {
        let mut buffer = OutputBuffer::new(64);
        buffer.push("first".to_string());
        buffer.push("second".to_string());

        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.bytes(), 13);
        assert_eq!(buffer.contents(), "first\nsecond");
        assert_eq!(buffer.evicted_lines(), 0);
    }

    #[test]
    fn test_evicts_oldest_lines() {
        let mut buffer = OutputBuffer::new(12);
        buffer.push("aaaa".to_string());
        buffer.push("bbbb".to_string());
        buffer.push("cccc".to_string());

        assert_eq!(buffer.contents(), "bbbb\ncccc");
        assert_eq!(buffer.evicted_lines(), 1);
        assert!(buffer.bytes() <= 12);
    }

    #[test]
    fn test_line_larger_than_capacity_is_not_kept() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push("too long for the buffer".to_string());

        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes(), 0);
        assert_eq!(buffer.evicted_lines(), 1);
    }

    #[test]
    fn test_tail() {
        let mut buffer = OutputBuffer::new(1024);
        for i in 0..5 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.tail(2), "line 3\nline 4");
        assert_eq!(buffer.tail(10).lines().count(), 5);
    }

    #[test]
    fn test_heavy_output_stays_bounded() {
        let mut buffer = OutputBuffer::new(1000);
        for i in 0..10_000 {
            buffer.push(format!("executor chatter {}", i));
        }
        assert!(buffer.bytes() <= 1000);
        assert!(buffer.contents().ends_with("executor chatter 9999"));
    }
}
