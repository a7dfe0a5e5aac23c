use bytes::{Bytes, BytesMut};

/// Largest accepted argument count in a single request.
const MAX_ARGS: i64 = 1024 * 1024;
/// Largest accepted bulk argument (512MB).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// A header line longer than this without a CRLF is rejected.
const MAX_LINE_LEN: usize = 64 * 1024;

/// A reply value in wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK\r\n
    SimpleString(String),
    /// -ERR message\r\n
    Error(String),
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n  or  $-1\r\n (null)
    BulkString(Option<Vec<u8>>),
    /// *2\r\n...
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(items: Vec<RespValue>) -> Self {
        RespValue::Array(items)
    }

    /// Serialize this value to wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    /// Write wire bytes into the given buffer.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.push(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                buf.push(b'*');
                buf.extend_from_slice(items.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for item in items {
                    item.write_to(buf);
                }
            }
        }
    }
}

/// Encode a command as a request frame: an array of bulk strings.
///
/// This is the format clients send and the format of every log record.
pub fn encode_request<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let items = args
        .iter()
        .map(|a| RespValue::bulk_string(a.as_ref().to_vec()))
        .collect();
    RespValue::array(items).serialize()
}

/// Streaming request decoder.
///
/// Handles partial reads: call `parse()` repeatedly as data arrives.
/// Returns `Ok(Some(args))` when a complete frame is available,
/// `Ok(None)` when more data is needed.
pub struct RespParser;

impl RespParser {
    /// Try to decode one request frame from the front of `buf`.
    ///
    /// A frame is `*<N>\r\n` followed by `N` bulk strings. On success the
    /// frame's bytes are consumed from `buf` and the arguments are returned
    /// as zero-copy slices of it. Nothing is consumed when the frame is
    /// incomplete or malformed.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<Vec<Bytes>>, RespError> {
        if buf.is_empty() {
            return Ok(None);
        }
        if buf[0] != b'*' {
            return Err(RespError::UnexpectedByte {
                expected: '*',
                got: buf[0],
            });
        }

        let (count, mut pos) = match read_header(buf, 0)? {
            Some(header) => header,
            None => return Ok(None),
        };
        if count <= 0 || count > MAX_ARGS {
            return Err(RespError::InvalidData("invalid multibulk length".into()));
        }

        // (offset, len) of each argument's payload within the frame
        let mut spans = Vec::with_capacity(count as usize);
        for _ in 0..count {
            if pos >= buf.len() {
                return Ok(None);
            }
            if buf[pos] != b'$' {
                return Err(RespError::UnexpectedByte {
                    expected: '$',
                    got: buf[pos],
                });
            }
            let (len, data_start) = match read_header(buf, pos)? {
                Some(header) => header,
                None => return Ok(None),
            };
            if !(0..=MAX_BULK_LEN).contains(&len) {
                return Err(RespError::InvalidData("invalid bulk length".into()));
            }
            let len = len as usize;
            let data_end = data_start + len;
            if buf.len() < data_end + 2 {
                return Ok(None);
            }
            if &buf[data_end..data_end + 2] != b"\r\n" {
                return Err(RespError::InvalidData(
                    "bulk length does not match terminator".into(),
                ));
            }
            spans.push((data_start, len));
            pos = data_end + 2;
        }

        let frame = buf.split_to(pos).freeze();
        Ok(Some(
            spans
                .into_iter()
                .map(|(start, len)| frame.slice(start..start + len))
                .collect(),
        ))
    }
}

/// Read a `<marker><integer>\r\n` line starting at `start`.
/// Returns the integer and the offset just past the CRLF.
fn read_header(buf: &[u8], start: usize) -> Result<Option<(i64, usize)>, RespError> {
    let crlf = match find_crlf_from(buf, start + 1) {
        Some(pos) => pos,
        None => {
            if buf.len() - start > MAX_LINE_LEN {
                return Err(RespError::InvalidData("header line too long".into()));
            }
            return Ok(None);
        }
    };
    let text = std::str::from_utf8(&buf[start + 1..crlf])
        .map_err(|_| RespError::InvalidData("invalid length encoding".into()))?;
    let n: i64 = text
        .parse()
        .map_err(|_| RespError::InvalidData(format!("invalid length: {text}")))?;
    Ok(Some((n, crlf + 2)))
}

/// Find \r\n starting from the given position.
fn find_crlf_from(buf: &[u8], start: usize) -> Option<usize> {
    if buf.len() < start + 2 {
        return None;
    }
    buf[start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .map(|i| start + i)
}

#[derive(Debug, thiserror::Error)]
pub enum RespError {
    #[error("expected '{expected}', got '{}'", *.got as char)]
    UnexpectedByte { expected: char, got: u8 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection closed in the middle of a frame")]
    Truncated,
}
