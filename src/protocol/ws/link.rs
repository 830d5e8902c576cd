use flume::{Receiver, TryRecvError};

use super::{
    messages::{Inbound, Outbound},
    socket::MessageSocket,
};
use crate::{
    core::Shutdown,
    error::{BridgeError, Result},
};

/// Drive one console connection until shutdown or disconnect.
///
/// Each iteration first flushes every queued outbound message, then waits up
/// to the socket's read timeout for one inbound frame. Inbound frames that do
/// not parse are logged and dropped; valid ones go to `on_message`.
///
/// Returns `Ok(())` after a requested shutdown and `Err(Disconnected)` when
/// the connection is lost or every outbound sender is gone.
pub fn run_link<S, F>(
    mut socket: S,
    outbound: Receiver<Outbound>,
    mut on_message: F,
    shutdown: Shutdown,
) -> Result<()>
where
    S: MessageSocket,
    F: FnMut(Inbound),
{
    let result = loop {
        if shutdown.is_triggered() {
            break Ok(());
        }

        if let Err(err) = flush_outbound(&mut socket, &outbound) {
            break Err(err);
        }

        match socket.recv() {
            Ok(Some(text)) => match Inbound::parse(&text) {
                Ok(message) => {
                    log::debug!("Console -> bridge: {message:?}");
                    on_message(message);
                }
                Err(err) => log::warn!("Dropping console message: {err}"),
            },
            Ok(None) => {}
            Err(err) => break Err(err),
        }
    };

    socket.close();
    if let Err(err) = &result {
        log::error!("Console link lost: {err}");
    }
    result
}

fn flush_outbound<S: MessageSocket>(socket: &mut S, outbound: &Receiver<Outbound>) -> Result<()> {
    loop {
        match outbound.try_recv() {
            Ok(message) => {
                let text = match message.to_json() {
                    Ok(text) => text,
                    Err(err) => {
                        log::error!("Failed to encode {}: {err}", message.kind());
                        continue;
                    }
                };
                socket.send(&text)?;
            }
            Err(TryRecvError::Empty) => return Ok(()),
            Err(TryRecvError::Disconnected) => {
                return Err(BridgeError::Disconnected(
                    "outbound queue closed".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ws::socket::ChannelSocket;
    use std::{thread, time::Duration};

    #[test]
    fn test_link_forwards_both_directions() {
        let (socket, console) = ChannelSocket::pair(Duration::from_millis(2));
        let (out_tx, out_rx) = flume::unbounded();
        let (in_tx, in_rx) = flume::unbounded();
        let shutdown = Shutdown::new();

        let link_shutdown = shutdown.clone();
        let link = thread::spawn(move || {
            run_link(
                socket,
                out_rx,
                move |message| {
                    let _ = in_tx.send(message);
                },
                link_shutdown,
            )
        });

        console.send(r#"{"type":"bogus"}"#);
        console.send(r#"{"type":"set_work_position"}"#);
        out_tx.send(Outbound::UpdateSlider { position: 7 }).unwrap();

        assert_eq!(
            in_rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            Inbound::SetWorkPosition
        );
        let sent = console.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(sent["type"], "update_slider");

        shutdown.trigger();
        assert!(link.join().unwrap().is_ok());
        assert!(in_rx.try_recv().is_err(), "invalid message must be dropped");
    }

    #[test]
    fn test_link_reports_disconnect() {
        let (socket, console) = ChannelSocket::pair(Duration::from_millis(2));
        let (_out_tx, out_rx) = flume::unbounded::<Outbound>();
        drop(console);
        let result = run_link(socket, out_rx, |_| {}, Shutdown::new());
        assert!(matches!(result, Err(BridgeError::Disconnected(_))));
    }
}
