//! TCP link between the transfer engine and a receiver.
//!
//! The receiver is reached through a serial-to-TCP bridge. Bytes written by
//! the engine go through a writer task; bytes read from the socket are cut
//! into frames by a reader task and fed back to the engine. Deadlines are
//! polled on a fixed interval.

use crate::config::AgnssConfig;
use crate::{component_debug, component_info, component_warn};
use agnss_session::{
    EventInterface, LegacyAidingEvent, MessageInfo, MgaEngine, MgaError, ProgressEvent,
};
use agnss_wire::FrameDecoder;
use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER_SIZE: usize = 4096;

/// Connected engine with its I/O tasks
pub struct Bridge {
    engine: Arc<MgaEngine>,
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    frames: mpsc::UnboundedReceiver<Bytes>,
    writer_task: JoinHandle<()>,
    reader_task: JoinHandle<()>,
    check_interval: Duration,
}

impl Bridge {
    /// Connect to `addr` and install a configured engine
    pub async fn connect(config: &AgnssConfig, addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to receiver at {}", addr))?;
        stream.set_nodelay(true)?;
        component_info!("bridge", "Connected to receiver at {}", addr);

        let (read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<Bytes>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<ProgressEvent>();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel::<Bytes>();

        let engine = Arc::new(MgaEngine::new());
        engine.configure(
            config.flow_config(),
            EventInterface::new(
                move |bytes: &[u8]| {
                    if write_tx.send(Bytes::copy_from_slice(bytes)).is_err() {
                        component_warn!("bridge", "Writer closed, dropping {} bytes", bytes.len());
                    }
                },
                move |event: &ProgressEvent| {
                    log_progress(event);
                    let _ = event_tx.send(event.clone());
                },
            ),
        )?;

        Ok(Self {
            engine,
            events: event_rx,
            frames: frame_rx,
            writer_task: tokio::spawn(write_loop(write_half, write_rx)),
            reader_task: tokio::spawn(read_loop(read_half, frame_tx)),
            check_interval: config.timeout_check_interval,
        })
    }

    pub fn engine(&self) -> &MgaEngine {
        &self.engine
    }

    /// Pump frames and deadlines until the session ends.
    ///
    /// On Ctrl-C `cancel` is invoked once; the session is then expected to
    /// report its own terminal event. Returns that event.
    pub async fn run<C>(mut self, cancel: C) -> Result<ProgressEvent>
    where
        C: Fn(&MgaEngine) -> Result<(), MgaError>,
    {
        let mut ticker = tokio::time::interval(self.check_interval);
        let mut cancelled = false;

        let outcome = loop {
            tokio::select! {
                Some(event) = self.events.recv() => {
                    if event.is_terminal() {
                        break Ok(event);
                    }
                }

                frame = self.frames.recv() => match frame {
                    Some(frame) => {
                        let disposition = self.engine.process_receiver_message(&frame);
                        component_debug!("bridge", "Frame of {} bytes {:?}", frame.len(), disposition);
                    }
                    None => break Err(anyhow::anyhow!("receiver closed the connection")),
                },

                _ = ticker.tick() => {
                    self.engine.check_for_timeouts()?;
                }

                result = tokio::signal::ctrl_c(), if !cancelled => {
                    result?;
                    cancelled = true;
                    component_info!("bridge", "Interrupted, stopping session");
                    cancel(&self.engine)?;
                }
            }
        };

        self.reader_task.abort();
        // Let queued frames (such as the final CFG-MSG) reach the receiver
        drop(self.engine);
        if tokio::time::timeout(Duration::from_secs(1), &mut self.writer_task)
            .await
            .is_err()
        {
            self.writer_task.abort();
        }
        outcome
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            component_warn!("bridge", "Write to receiver failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(mut reader: OwnedReadHalf, tx: mpsc::UnboundedSender<Bytes>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                component_info!("bridge", "Receiver connection closed");
                return;
            }
            Ok(_) => {
                while let Some(frame) = decoder.decode(&mut buf) {
                    if tx.send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                component_warn!("bridge", "Read from receiver failed: {}", e);
                return;
            }
        }
    }
}

/// Fail unless the session ended normally
pub fn ensure_finished(event: &ProgressEvent) -> Result<()> {
    match event {
        ProgressEvent::Finish | ProgressEvent::LegacyAiding(LegacyAidingEvent::ServerStopped) => {
            Ok(())
        }
        ProgressEvent::Terminated(reason) => bail!("session terminated: {:?}", reason),
        other => bail!("session ended unexpectedly: {:?}", other),
    }
}

fn describe(info: &MessageInfo) -> String {
    format!(
        "#{} {} len={} retries={}",
        info.sequence, info.msg_id, info.len, info.retry_count
    )
}

pub fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Start { total } => {
            component_info!("transfer", "Transfer started with {} items", total)
        }
        ProgressEvent::Sent(info) => component_debug!("transfer", "Sent {}", describe(info)),
        ProgressEvent::TransferComplete(info) => {
            component_debug!("transfer", "Acknowledged {}", describe(info))
        }
        ProgressEvent::TransferFailed(info) => component_warn!(
            "transfer",
            "Failed {} reason={:?}",
            describe(info),
            info.failure
        ),
        ProgressEvent::Finish => component_info!("transfer", "Transfer finished"),
        ProgressEvent::Terminated(reason) => {
            component_warn!("transfer", "Transfer terminated: {:?}", reason)
        }
        ProgressEvent::LegacyAiding(legacy) => match legacy {
            LegacyAidingEvent::FlashBlockFailed(info) => {
                component_warn!("legacy", "Block failed {}", describe(info))
            }
            LegacyAidingEvent::StartupFailed(_) | LegacyAidingEvent::FinalizeFailed => {
                component_warn!("legacy", "{:?}", legacy)
            }
            LegacyAidingEvent::ServerStarted { file_id } => {
                component_info!("legacy", "Serving ALP file id={}", file_id)
            }
            other => component_debug!("legacy", "{:?}", other),
        },
        other => component_info!("source", "{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agnss_session::TerminationReason;

    #[test]
    fn test_ensure_finished() {
        assert!(ensure_finished(&ProgressEvent::Finish).is_ok());
        assert!(ensure_finished(&ProgressEvent::LegacyAiding(
            LegacyAidingEvent::ServerStopped
        ))
        .is_ok());
        assert!(ensure_finished(&ProgressEvent::Terminated(TerminationReason::HostCancel)).is_err());
    }

    #[tokio::test]
    async fn test_read_loop_splits_frames() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let ack = agnss_wire::build_frame(0x05, 0x01, &[&[0x0B, 0x30]]).unwrap();
        let mut stream = vec![0x00, 0x42];
        stream.extend_from_slice(&ack);
        stream.extend_from_slice(&ack);
        server.write_all(&stream).await.unwrap();
        drop(server);

        let (read_half, _write_half) = client.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        read_loop(read_half, tx).await;

        assert_eq!(rx.recv().await.unwrap(), ack);
        assert_eq!(rx.recv().await.unwrap(), ack);
        assert!(rx.recv().await.is_none());
    }
}
