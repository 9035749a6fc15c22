//! Header line stripping for downloaded payloads

/// Line terminator counted when skipping lines
const NEWLINE: u8 = b'\n';

/// Outcome of stripping leading lines from a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    /// Bytes left after the skipped lines
    pub payload: Vec<u8>,
    /// Number of lines actually removed
    pub lines_removed: usize,
}

impl Stripped {
    /// True when fewer newlines were present than requested and nothing was removed
    pub fn under_supplied(&self, requested: usize) -> bool {
        requested > 0 && self.lines_removed == 0
    }
}

/// Remove the first `skip` newline-terminated lines from `data`
///
/// The payload is scanned for the `skip`-th `\n` and everything up to and
/// including it is dropped. With `skip == 0` the payload passes through.
///
/// If the payload holds fewer than `skip` newlines it is returned unchanged:
/// a short file is delivered whole rather than emptied.
///
/// # Examples
///
/// ```
/// use ftp_inbound::transform::skip_lines;
///
/// let out = skip_lines(b"line1\nline2\nline3\n".to_vec(), 2);
/// assert_eq!(out.payload, b"line3\n");
/// assert_eq!(out.lines_removed, 2);
/// ```
pub fn skip_lines(data: Vec<u8>, skip: usize) -> Stripped {
    if skip == 0 {
        return Stripped {
            payload: data,
            lines_removed: 0,
        };
    }

    let cut = data
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == NEWLINE)
        .nth(skip - 1)
        .map(|(pos, _)| pos);

    match cut {
        Some(pos) => {
            let mut data = data;
            data.drain(..=pos);
            Stripped {
                payload: data,
                lines_removed: skip,
            }
        }
        None => Stripped {
            payload: data,
            lines_removed: 0,
        },
    }
}
