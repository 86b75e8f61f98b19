//! End-to-end shell scenarios with literal expected output.

use conch_kernel::chan::{chan, Receiver, TryRecv};
use conch_kernel::{Ctx, Shell};
use conch_types::Msg;

/// A shell whose root `out`/`err` are captured.
fn harness() -> (Shell, Ctx, Receiver<Msg>) {
    let sh = Shell::new();
    let ctx = Ctx::new();
    let (tx, rx) = chan(1 << 16);
    ctx.set_out("out", tx.clone());
    ctx.set_out("err", tx);
    (sh, ctx, rx)
}

fn drained(rx: &Receiver<Msg>) -> String {
    let mut s = String::new();
    loop {
        match rx.try_recv() {
            TryRecv::Msg(Msg::Bytes(b)) => s.push_str(&String::from_utf8_lossy(&b)),
            TryRecv::Msg(_) => {}
            _ => break,
        }
    }
    s
}

async fn run(src: &str) -> String {
    let (sh, ctx, rx) = harness();
    sh.run_src(src, &ctx).await.unwrap();
    drained(&rx)
}

#[tokio::test]
async fn echo_rf_cnt() {
    assert_eq!(
        run("echo ☺ | rf | cnt -u").await,
        "       1        1        1        2        4  in\n"
    );
}

#[tokio::test]
async fn grouped_echoes_coalesce_through_rf() {
    assert_eq!(
        run("(echo z☺ ; echo a b) | rf | cnt -u").await,
        "       1        2        3        7        9  in\n"
    );
}

#[tokio::test]
async fn all_and_cnt_report_per_file() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("1"), b"").unwrap();
    std::fs::write(tmp.path().join("2"), vec![b'\n'; 4096]).unwrap();
    let (sh, ctx, rx) = harness();
    ctx.cd(tmp.path().to_path_buf());
    sh.run_src("all 1 2 | cnt -mu", &ctx).await.unwrap();
    assert_eq!(drained(&rx), "       0  1\n       1  2\n       1  total\n");
}

#[tokio::test]
async fn append_redirection_doubles_the_file() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("2"), vec![b'\n'; 4096]).unwrap();
    let (sh, ctx, rx) = harness();
    ctx.cd(tmp.path().to_path_buf());
    sh.run_src("rf <2 >3 ; rf <2 >>3 ; cnt -lu <3", &ctx)
        .await
        .unwrap();
    assert_eq!(drained(&rx), "    8192  in\n");
}

#[tokio::test]
async fn nested_for_in_lexical_order() {
    let out = run("for x in a b c { for y in c d e { echo $x $y } }").await;
    let want = "a c\na d\na e\nb c\nb d\nb e\nc c\nc d\nc e\n";
    assert_eq!(out, want);
}

#[tokio::test]
async fn broadcasting_and_joining() {
    let (sh, ctx, rx) = harness();
    sh.run_src("x=(a b c)", &ctx).await.unwrap();
    sh.run_src("echo (z)^$x", &ctx).await.unwrap();
    assert_eq!(drained(&rx), "za zb zc\n");
    sh.run_src("echo (z)^$^x", &ctx).await.unwrap();
    assert_eq!(drained(&rx), "za b c\n");
}

#[tokio::test]
async fn indexed_assignment_appends() {
    let (sh, ctx, rx) = harness();
    sh.run_src("x=(a b)", &ctx).await.unwrap();
    sh.run_src("x[2]=z\nx[3]=z\necho $x", &ctx).await.unwrap();
    assert_eq!(drained(&rx), "a b z z\n");
}

#[tokio::test]
async fn diff_of_a_one_line_change() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("a"), "one\ntwo\nthree\n").unwrap();
    std::fs::write(tmp.path().join("b"), "one\nTWO\nthree\n").unwrap();
    let (sh, ctx, rx) = harness();
    ctx.cd(tmp.path().to_path_buf());
    sh.run_src("diffs a b", &ctx).await.unwrap();
    let out = drained(&rx);
    assert!(out.starts_with("#diff a b\n"), "{out:?}");
    assert!(out.contains("-two\n"), "{out:?}");
    assert!(out.contains("+TWO\n"), "{out:?}");
}

#[tokio::test]
async fn diff_via_io_substitution() {
    let (sh, ctx, rx) = harness();
    sh.run_src("diffs <{echo old} <{echo new}", &ctx).await.unwrap();
    let out = drained(&rx);
    assert!(out.contains("-old\n"), "{out:?}");
    assert!(out.contains("+new\n"), "{out:?}");
}

#[tokio::test]
async fn lines_pipeline_selects_ranges() {
    let out = run("(echo a ; echo b ; echo c ; echo d) | rf | lns -r 2,-2").await;
    assert_eq!(out, "b\nc\n");
}

#[tokio::test]
async fn grep_pipeline_filters_and_counts() {
    let out = run("(echo one ; echo two ; echo twenty) | rf | gr tw | cnt -lu").await;
    assert_eq!(out, "       2  in\n");
}

#[tokio::test]
async fn sort_pipeline() {
    let out = run("(echo pear ; echo apple) | rf | srt").await;
    assert_eq!(out, "apple\npear\n");
}

#[tokio::test]
async fn xp_calculates() {
    // `^` is list concatenation to the shell, so the expression is quoted
    assert_eq!(run("xp '2 ^ 10'").await, "1024\n");
    assert_eq!(run("xp 1 + 2 * 3").await, "7\n");
}

#[tokio::test]
async fn status_is_visible_to_scripts() {
    let (sh, ctx, rx) = harness();
    let _ = sh.run_src("nosuchcmd", &ctx).await;
    sh.run_src("echo status is $#status words", &ctx).await.unwrap();
    let out = drained(&rx);
    assert_eq!(out, "status is 1 words\n");
}

#[tokio::test]
async fn functions_compose_with_pipes() {
    let out = run("func shout { rf | gr o }\n(echo foo ; echo bar) | rf | shout").await;
    assert_eq!(out, "foo\n");
}
