//! Control sequences the server writes into a connection's output stream.
//!
//! "Urgent" sequences are processed by the browser ahead of ordinary output;
//! the out-of-band start marks a request the browser must answer.

/// Start of an urgent sequence.
pub const URGENT_START: &[u8] = b"\x13\x16";
/// Start of an out-of-band request.
pub const OUT_OF_BAND_START: &[u8] = b"\x13\x17";
/// End of an urgent or out-of-band sequence.
pub const URGENT_END: &[u8] = b"\x14";

/// Sent once a session's process is gone.
pub const EOF_MESSAGE: &[u8] = b"\x13\x16\x1b[99;99u\x14";
/// Asks the browser to capture and report its window contents.
pub const REQUEST_CONTENTS: &[u8] = b"\x13\x17\x1b[81u\x14";

fn urgent(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(URGENT_START.len() + body.len() + URGENT_END.len());
    out.extend_from_slice(URGENT_START);
    out.extend_from_slice(body);
    out.extend_from_slice(URGENT_END);
    out
}

/// Title and pid announcement for a freshly initialized connection.
pub fn banner(session_number: u32, pid: u32) -> Vec<u8> {
    format!("\x1b]30;DomTerm:{session_number}\x07\x1b]31;{pid}\x07").into_bytes()
}

/// Replay of a window snapshot saved by a previous viewer.
pub fn saved_contents(contents: &str) -> Vec<u8> {
    urgent(format!("\x1b]103;{contents}\x07").as_bytes())
}

/// Upload of the settings object.
pub fn settings(json: &str) -> Vec<u8> {
    urgent(format!("\x1b]89;{json}\x07").as_bytes())
}

/// Detach-save-state notification: 0 = other viewers remain, 1 = the
/// session ends when this viewer leaves, 2 = the session will detach.
pub fn detach_save(code: u8) -> Vec<u8> {
    urgent(format!("\x1b[82;{code}u").as_bytes())
}

/// Client-side line editing echo: the key event data is handed back to the
/// browser instead of the pty while it is in canonical mode.
pub fn line_edit_echo(echoing: bool, raw_key: &str) -> Vec<u8> {
    let code = if echoing { 74 } else { 73 };
    format!("\x1b]{code};{raw_key}\x07").into_bytes()
}

/// Ask the focused browser to show session `pid` using placement `op`.
pub fn show_session(op: u8, pid: u32) -> Vec<u8> {
    urgent(format!("\x1b[90;{op};{pid}u").as_bytes())
}

/// Ask the focused browser to open `url` using placement `op`.
pub fn show_url(op: u8, url: &str) -> Vec<u8> {
    urgent(format!("\x1b]104;{op},{url}\x07").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_match_builders() {
        let mut eof = Vec::new();
        eof.extend_from_slice(URGENT_START);
        eof.extend_from_slice(b"\x1b[99;99u");
        eof.extend_from_slice(URGENT_END);
        assert_eq!(eof, EOF_MESSAGE);

        assert!(REQUEST_CONTENTS.starts_with(OUT_OF_BAND_START));
        assert!(REQUEST_CONTENTS.ends_with(URGENT_END));
    }

    #[test]
    fn test_banner() {
        assert_eq!(banner(3, 4242), b"\x1b]30;DomTerm:3\x07\x1b]31;4242\x07".to_vec());
    }

    #[test]
    fn test_detach_save_codes() {
        assert_eq!(detach_save(0), b"\x13\x16\x1b[82;0u\x14".to_vec());
        assert_eq!(detach_save(2), b"\x13\x16\x1b[82;2u\x14".to_vec());
    }

    #[test]
    fn test_line_edit_echo() {
        assert_eq!(line_edit_echo(true, "\"a\""), b"\x1b]74;\"a\"\x07".to_vec());
        assert_eq!(line_edit_echo(false, "\"a\""), b"\x1b]73;\"a\"\x07".to_vec());
    }

    #[test]
    fn test_wrapped_payloads() {
        assert_eq!(settings("{}"), b"\x13\x16\x1b]89;{}\x07\x14".to_vec());
        assert_eq!(saved_contents("x"), b"\x13\x16\x1b]103;x\x07\x14".to_vec());
        assert_eq!(show_session(2, 77), b"\x13\x16\x1b[90;2;77u\x14".to_vec());
        assert_eq!(show_url(1, "http://h/"), b"\x13\x16\x1b]104;1,http://h/\x07\x14".to_vec());
    }
}
