#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! Text nodes escape `&`, `<`, `>` and CR. Attribute values escape `&`, `<`,
//! `"`, TAB, LF and CR. Processing-instruction data only escapes CR.
//! Unescaped runs are written straight to the sink.

use std::io::{self, Write};

fn write_escaped<W: Write>(
    out: &mut W,
    s: &str,
    replace: impl Fn(u8) -> Option<&'static str>,
) -> io::Result<()> {
    let bytes = s.as_bytes();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if let Some(rep) = replace(*b) {
            out.write_all(&bytes[start..i])?;
            out.write_all(rep.as_bytes())?;
            start = i + 1;
        }
    }
    out.write_all(&bytes[start..])
}

pub fn write_text<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    write_escaped(out, s, |b| match b {
        b'&' => Some("&amp;"),
        b'<' => Some("&lt;"),
        b'>' => Some("&gt;"),
        b'\r' => Some("&#xD;"),
        _ => None,
    })
}

pub fn write_attr<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    write_escaped(out, s, |b| match b {
        b'&' => Some("&amp;"),
        b'<' => Some("&lt;"),
        b'"' => Some("&quot;"),
        b'\t' => Some("&#x9;"),
        b'\n' => Some("&#xA;"),
        b'\r' => Some("&#xD;"),
        _ => None,
    })
}

pub fn write_pi<W: Write>(out: &mut W, s: &str) -> io::Result<()> {
    write_escaped(out, s, |b| (b == b'\r').then_some("&#xD;"))
}
