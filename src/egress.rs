//! Stock egress transforms for [`Runner::egress`](crate::Runner::egress).
//!
//! An egress receives the captured output (newlines already stripped unless the
//! runner keeps them) and turns it into whatever the caller wants back.

use anyhow::Context;
use std::io::Write;

/// Return the captured bytes untouched. This is the default egress.
pub fn bytes(out: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    Ok(out)
}

/// Decode the output as UTF-8, failing on invalid sequences.
pub fn text(out: Vec<u8>) -> anyhow::Result<String> {
    String::from_utf8(out).context("output is not valid UTF-8")
}

/// Decode the output as UTF-8, replacing invalid sequences.
pub fn text_lossy(out: Vec<u8>) -> anyhow::Result<String> {
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Split the decoded output into lines.
pub fn lines(out: Vec<u8>) -> anyhow::Result<Vec<String>> {
    let text = text(out)?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Write the output to our own stdout and return nothing.
pub fn print(out: Vec<u8>) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&out)?;
    if !out.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rejects_invalid_utf8() {
        assert_eq!(text(b"hi".to_vec()).unwrap(), "hi");
        assert!(text(vec![0xff, 0xfe]).is_err());
        assert_eq!(text_lossy(vec![b'a', 0xff]).unwrap(), "a\u{fffd}");
    }

    #[test]
    fn lines_splits_on_newlines() {
        assert_eq!(lines(b"a\nb\r\nc".to_vec()).unwrap(), ["a", "b", "c"]);
        assert!(lines(Vec::new()).unwrap().is_empty());
    }
}
