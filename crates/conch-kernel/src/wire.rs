//! Message framing for channels that cross an OS fd.
//!
//! Inside one process, typed messages move on `chan` channels. When a
//! stream leaves the process it is framed as
//!
//! ```text
//!   size[4] tag[4] typ[2] data[size]      (little endian)
//! ```
//!
//! where `typ` identifies the message variant. Unknown types are carried
//! as `Ign` payloads so filters can forward what they do not understand.
//! Unix IO mode skips framing entirely: `read_bytes`/`write_bytes` carry
//! raw data and drop everything that is not a `Bytes` payload.

use conch_types::{Addr, CmdError, Dir, Msg};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chan::{Receiver, Sender};

/// Maximum accepted frame payload.
pub const MAX_MSG_SZ: usize = 64 * 1024;
/// Chunk size used when turning a raw byte stream into messages.
pub const MSG_SZ: usize = 16 * 1024;

const HDR_SZ: usize = 4 + 4 + 2;

const T_BYTES: u16 = 1;
const T_IGN: u16 = 2;
const T_ERR: u16 = 4;
const T_ADDR: u16 = 5;
const T_DIR: u16 = 6;

/// Frame one message. `Other` payloads cannot cross the boundary and are
/// discarded (`None`).
pub fn pack_msg(tag: u32, m: &Msg) -> Option<Vec<u8>> {
    let (typ, data): (u16, Vec<u8>) = match m {
        Msg::Bytes(b) => (T_BYTES, b.clone()),
        Msg::Ign(b) => (T_IGN, b.clone()),
        Msg::Err(e) => (T_ERR, serde_json::to_vec(e).ok()?),
        Msg::Addr(a) => (T_ADDR, serde_json::to_vec(a).ok()?),
        Msg::Dir(d) => (T_DIR, serde_json::to_vec(d).ok()?),
        Msg::Other(_) => return None,
    };
    let mut out = Vec::with_capacity(HDR_SZ + data.len());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&typ.to_le_bytes());
    out.extend_from_slice(&data);
    Some(out)
}

/// Decode one frame payload back into a message.
pub fn unpack_msg(typ: u16, data: &[u8]) -> Msg {
    match typ {
        T_BYTES => Msg::Bytes(data.to_vec()),
        T_ERR => serde_json::from_slice::<CmdError>(data)
            .map(Msg::Err)
            .unwrap_or_else(|_| Msg::Err(CmdError::other(String::from_utf8_lossy(data)))),
        T_ADDR => serde_json::from_slice::<Addr>(data)
            .map(Msg::Addr)
            .unwrap_or_else(|_| Msg::Ign(data.to_vec())),
        T_DIR => serde_json::from_slice::<Dir>(data)
            .map(Msg::Dir)
            .unwrap_or_else(|_| Msg::Ign(data.to_vec())),
        _ => Msg::Ign(data.to_vec()),
    }
}

/// Read frames from `r` and send them on `tx` until EOF. The channel is
/// not closed here; the caller closes it with the returned status.
pub async fn read_msgs<R>(r: &mut R, tx: &Sender<Msg>) -> Result<(), CmdError>
where
    R: AsyncRead + Unpin,
{
    let mut hdr = [0u8; HDR_SZ];
    loop {
        match r.read_exact(&mut hdr).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        let sz = u32::from_le_bytes([hdr[0], hdr[1], hdr[2], hdr[3]]) as usize;
        let typ = u16::from_le_bytes([hdr[8], hdr[9]]);
        if sz > MAX_MSG_SZ {
            return Err(CmdError::other("message size is too large"));
        }
        let mut data = vec![0u8; sz];
        if sz > 0 {
            r.read_exact(&mut data).await?;
        }
        if !tx.send(unpack_msg(typ, &data)).await {
            return Err(tx.cause().unwrap_or(CmdError::Intr));
        }
    }
}

/// Drain `rx`, writing each message as a frame. A close cause becomes a
/// trailing error frame so the peer learns why the stream ended.
pub async fn write_msgs<W>(w: &mut W, tag: u32, rx: &Receiver<Msg>) -> Result<(), CmdError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(m) = rx.recv().await {
        if let Some(frame) = pack_msg(tag, &m) {
            w.write_all(&frame).await?;
            w.flush().await?;
        }
    }
    if let Some(cause) = rx.cause() {
        if let Some(frame) = pack_msg(tag, &Msg::Err(cause.clone())) {
            w.write_all(&frame).await?;
            w.flush().await?;
        }
        return Err(cause);
    }
    Ok(())
}

/// Raw-byte ingress: chunk `r` into `Bytes` messages. The channel is not
/// closed here.
pub async fn read_bytes<R>(r: &mut R, tx: &Sender<Msg>) -> Result<(), CmdError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MSG_SZ];
    loop {
        let n = r.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if !tx.send(Msg::Bytes(buf[..n].to_vec())).await {
            return Err(tx.cause().unwrap_or(CmdError::Intr));
        }
    }
}

/// Unix egress: write only `Bytes` payloads, dropping message boundaries.
/// The first error message (or close cause) becomes the returned status.
pub async fn write_bytes<W>(w: &mut W, rx: &Receiver<Msg>) -> Result<(), CmdError>
where
    W: AsyncWrite + Unpin,
{
    let mut sts: Option<CmdError> = None;
    while let Some(m) = rx.recv().await {
        match m {
            Msg::Bytes(b) => {
                w.write_all(&b).await?;
                w.flush().await?;
            }
            Msg::Err(e) => {
                if sts.is_none() {
                    sts = Some(e);
                }
            }
            _ => {}
        }
    }
    match sts.or_else(|| rx.cause()) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
