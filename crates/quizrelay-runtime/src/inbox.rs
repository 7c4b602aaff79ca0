//! Audience inbox: newline-delimited JSON `{"account","from","body"}` over
//! TCP, one message per line. The carrier adapter is the only client.

use quizrelay_gateway::{AudienceMessage, NodeEvent};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn run_inbox(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<NodeEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = tokio::select! {
            r = listener.accept() => r?,
            () = cancel.cancelled() => return Ok(()),
        };
        tracing::debug!(peer = %addr, "inbox connection");
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = read_messages(stream, &tx).await {
                tracing::debug!(peer = %addr, error = %e, "inbox connection error");
            }
        });
    }
}

/// Forward every parsable line. Returns once the client closes.
async fn read_messages<R: AsyncRead + Unpin>(
    reader: R,
    tx: &mpsc::UnboundedSender<NodeEvent>,
) -> anyhow::Result<usize> {
    let mut lines = BufReader::new(reader).lines();
    let mut forwarded = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<AudienceMessage>(line) {
            Ok(msg) => {
                tx.send(NodeEvent::Audience(msg))
                    .map_err(|_| anyhow::anyhow!("gateway loop gone"))?;
                forwarded += 1;
            }
            Err(e) => tracing::warn!(error = %e, "unreadable inbox line"),
        }
    }
    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_become_audience_events() {
        let input = concat!(
            r#"{"account":"AC1","from":"+1","body":"play Alice"}"#,
            "\n\nnot json\n",
            r#"{"account":"AC1","from":"+1","body":"Moscow"}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let n = read_messages(input.as_bytes(), &tx).await.unwrap();
        assert_eq!(n, 2);

        let Some(NodeEvent::Audience(first)) = rx.recv().await else {
            panic!("expected an audience event");
        };
        assert_eq!(first.from, "+1");
        assert_eq!(first.body, "play Alice");
    }

    #[tokio::test]
    async fn closed_loop_stops_reading() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let input = br#"{"account":"AC1","from":"+1","body":"x"}"#;
        assert!(read_messages(&input[..], &tx).await.is_err());
    }
}
