// Match emission.
//
// One write per matched path, terminated by `\n` (or `\0` under -print0).
// `-count` suppresses per-path output and prints a single integer.

use std::io::{self, Write};

/// Write every matched path with the chosen terminator.
pub fn emit_paths<'a, W, I>(out: &mut W, paths: I, print0: bool) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a [u8]>,
{
    let terminator = if print0 { b"\0" as &[u8] } else { b"\n" };
    for path in paths {
        out.write_all(path)?;
        out.write_all(terminator)?;
    }
    Ok(())
}

/// Write the match count.
pub fn emit_count<W: Write>(out: &mut W, count: usize) -> io::Result<()> {
    writeln!(out, "{count}")
}
