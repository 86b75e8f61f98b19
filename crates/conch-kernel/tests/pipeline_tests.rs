//! The quantified laws: close propagation, pipeline ordering,
//! back-pressure termination, and cancellation.

use std::time::Duration;

use conch_kernel::chan::{chan, Receiver, TryRecv};
use conch_kernel::{Ctx, Shell};
use conch_types::{CmdError, Msg};

fn harness() -> (Shell, Ctx, Receiver<Msg>) {
    let sh = Shell::new();
    let ctx = Ctx::new();
    let (tx, rx) = chan(1 << 16);
    ctx.set_out("out", tx.clone());
    ctx.set_out("err", tx);
    (sh, ctx, rx)
}

fn drained(rx: &Receiver<Msg>) -> Vec<Msg> {
    let mut v = Vec::new();
    while let TryRecv::Msg(m) = rx.try_recv() {
        v.push(m);
    }
    v
}

/// Law 1: after a close with cause `e`, sends fail, a drained receiver
/// reports the end, and `cause` answers `e` from both endpoints forever.
#[tokio::test]
async fn close_propagation_law() {
    let (tx, rx) = chan::<Msg>(8);
    let cause = CmdError::other("the reason");
    rx.close(Some(cause.clone()));
    assert!(!tx.send(Msg::bytes("late")).await);
    assert!(matches!(rx.try_recv(), TryRecv::Closed));
    assert!(rx.recv().await.is_none());
    assert_eq!(tx.cause(), Some(cause.clone()));
    assert_eq!(rx.cause(), Some(cause));
}

/// Law 2: the message sequence observed downstream of a junction equals
/// exactly what the upstream stage sent.
#[tokio::test]
async fn pipeline_ordering_law() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a"), b"alpha").unwrap();
    std::fs::write(tmp.path().join("b"), b"beta").unwrap();
    let (sh, ctx, rx) = harness();
    ctx.cd(tmp.path().to_path_buf());

    // capture what lf -g sends directly...
    sh.run_src("lf -g a b", &ctx).await.unwrap();
    let direct: Vec<String> = drained(&rx).iter().map(describe).collect();

    // ...and what arrives through a junction and a forwarder
    let (sh2, ctx2, rx2) = harness();
    ctx2.cd(tmp.path().to_path_buf());
    sh2.run_src("lf -g a b | rf", &ctx2).await.unwrap();
    let piped: Vec<String> = drained(&rx2).iter().map(describe).collect();

    assert_eq!(direct, piped);
}

fn describe(m: &Msg) -> String {
    match m {
        Msg::Dir(d) => format!("dir:{}", d.name()),
        Msg::Bytes(b) => format!("bytes:{}", String::from_utf8_lossy(b)),
        other => format!("{other:?}"),
    }
}

/// Law 3: closing the terminal stage's input terminates every stage in
/// finite time without losing what was already received.
#[tokio::test]
async fn backpressure_termination_law() {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        let (tx_a, rx_a) = chan::<Msg>(4);
        let (tx_b, rx_b) = chan::<Msg>(4);

        // stage a: unbounded producer
        let a = tokio::spawn(async move {
            let mut sent = 0u64;
            loop {
                if !tx_a.send(Msg::bytes(sent.to_string())).await {
                    tx_a.close(tx_a.cause());
                    return sent;
                }
                sent += 1;
            }
        });
        // stage b: forwarder with the cooperative contract
        let b = tokio::spawn(async move {
            while let Some(m) = rx_a.recv().await {
                if !tx_b.send(m).await {
                    rx_a.close(tx_b.cause());
                    return;
                }
            }
        });
        // terminal stage: take a few, then close the input with a cause
        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(rx_b.recv().await.expect("five messages"));
        }
        rx_b.close(Some(CmdError::other("enough")));

        let produced = a.await.unwrap();
        b.await.unwrap();
        assert!(produced >= 5);
        assert_eq!(got.len(), 5);
        // received messages were not lost or reordered
        for (i, m) in got.iter().enumerate() {
            assert_eq!(m.data(), Some(i.to_string().as_bytes()));
        }
    })
    .await;
    assert!(result.is_ok(), "pipeline did not unwind after downstream close");
}

/// Cancellation: a raised interrupt stops commands at their next
/// suspension point and surfaces as `Intr`.
#[tokio::test]
async fn interrupt_cancels_pipes() {
    let (sh, ctx, _rx) = harness();
    ctx.intr().raise();
    let res = sh.run_src("echo never", &ctx).await;
    assert_eq!(res, Err(CmdError::Intr));
    assert_eq!(ctx.get_env("status"), "interrupted");
}

/// An error in one stage travels in-band: the downstream stage sees the
/// cause on its input and reports it as its own status.
#[tokio::test]
async fn error_carries_through_junctions() {
    let (sh, ctx, _rx) = harness();
    let res = sh.run_src("rf /definitely/missing | cnt", &ctx).await;
    assert!(matches!(res, Err(CmdError::NotExist(_))), "{res:?}");
}

/// Background pipes detach; wait collects their status.
#[tokio::test]
async fn background_jobs_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let (sh, ctx, _rx) = harness();
    ctx.cd(tmp.path().to_path_buf());
    sh.run_src("echo a > a.txt &one\necho b > b.txt &two", &ctx)
        .await
        .unwrap();
    sh.run_src("wait", &ctx).await.unwrap();
    assert!(tmp.path().join("a.txt").exists());
    assert!(tmp.path().join("b.txt").exists());
}

/// The typed stream shape survives adapters: one Dir per file, bytes
/// between, errors interleaved without breaking file boundaries.
#[tokio::test]
async fn stream_shape_through_adapters() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("x"), b"1\n2\n").unwrap();
    std::fs::write(tmp.path().join("y"), b"3\n").unwrap();
    let (sh, ctx, rx) = harness();
    ctx.cd(tmp.path().to_path_buf());
    sh.run_src("lf -g x y | all", &ctx).await.unwrap();
    let kinds: Vec<&str> = drained(&rx).iter().map(Msg::kind).collect();
    assert_eq!(kinds, ["dir", "bytes", "dir", "bytes"]);
}
