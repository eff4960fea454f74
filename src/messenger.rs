//! Transport between the arena and the player agents.
//!
//! The arena only needs one capability from the network layer: deliver a task message to the
//! agent listening at an address and return its textual reply, optionally opening a fresh
//! conversation first. [`Messenger`] is that seam; [`TcpMessenger`] is the default
//! implementation speaking newline-delimited JSON over one TCP stream per conversation.
//!
//! The same agent usually plays several game instances at once. Every exchange therefore
//! names its conversation (one per instance and seat), and context never leaks from one
//! conversation into another even when they share an address.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tracing::{instrument, trace};

/// Sends one message to a remote agent and waits for its reply.
///
/// Implementations must honour `timeout` for the whole exchange. They are shared between the
/// threads running independent game instances, hence `Send + Sync`.
pub trait Messenger: Send + Sync {
    /// Deliver `message` to the agent at `address` within `conversation` and return its reply.
    ///
    /// When `new_conversation` is set, any context kept for this conversation is discarded
    /// first. Other conversations with the same agent are left untouched.
    fn talk_to_agent(
        &self,
        message: &str,
        address: &str,
        conversation: &str,
        new_conversation: bool,
        timeout: Duration,
    ) -> anyhow::Result<String>;
}

impl<M: Messenger + ?Sized> Messenger for std::sync::Arc<M> {
    fn talk_to_agent(
        &self,
        message: &str,
        address: &str,
        conversation: &str,
        new_conversation: bool,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        (**self).talk_to_agent(message, address, conversation, new_conversation, timeout)
    }
}

/// One line of JSON per message, one TCP stream per conversation.
///
/// Streams are cached per `(conversation, address)`. A conversation lives as long as its
/// stream: `new_conversation` drops the cached stream and reconnects. Replies are read up to the first `\n`; agents must escape newlines inside their
/// text (which JSON string encoding does).
#[derive(Debug, Default)]
pub struct TcpMessenger {
    streams: Mutex<HashMap<(String, String), BufReader<TcpStream>>>,
}

impl TcpMessenger {
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self::default()
    }

    fn connect(address: &str, timeout: Duration) -> anyhow::Result<BufReader<TcpStream>> {
        let addr = address
            .to_socket_addrs()
            .with_context(|| format!("could not resolve '{address}'"))?
            .next()
            .ok_or_else(|| anyhow!("'{address}' resolves to no address"))?;
        let stream = TcpStream::connect_timeout(&addr, Self::CONNECT_TIMEOUT.min(timeout))
            .with_context(|| format!("could not connect to '{address}'"))?;
        stream
            .set_nodelay(true)
            .context("server error: setting nodelay")?;
        Ok(BufReader::new(stream))
    }

    fn send_and_recv(
        reader: &mut BufReader<TcpStream>,
        message: &str,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        let stream = reader.get_mut();
        stream
            .set_write_timeout(Some(timeout))
            .context("server error: setting write timeout")?;
        stream
            .set_read_timeout(Some(timeout))
            .context("server error: setting read timeout")?;

        let mut line = message.replace('\n', "\\n");
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .context("I/O error while sending msg")?;

        let mut reply = String::new();
        let n = reader
            .read_line(&mut reply)
            .context("error while reading stream")?;
        if n == 0 {
            bail!("connection closed by agent");
        }
        Ok(reply.trim_end_matches(['\r', '\n']).to_owned())
    }
}

impl Messenger for TcpMessenger {
    #[instrument(skip(self, message))]
    fn talk_to_agent(
        &self,
        message: &str,
        address: &str,
        conversation: &str,
        new_conversation: bool,
        timeout: Duration,
    ) -> anyhow::Result<String> {
        let key = (conversation.to_owned(), address.to_owned());
        // taken out of the map so that other conversations are not blocked during the exchange
        let cached = {
            let mut guard = self.streams.lock().map_err(|_| anyhow!("poisoned"))?;
            guard.remove(&key)
        };
        let mut reader = match cached {
            Some(reader) if !new_conversation => reader,
            _ => {
                trace!("opening conversation");
                Self::connect(address, timeout)?
            }
        };

        let reply = Self::send_and_recv(&mut reader, message, timeout)?;

        let mut guard = self.streams.lock().map_err(|_| anyhow!("poisoned"))?;
        guard.insert(key, reader);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Answers every line with the number of the connection it arrived on.
    fn echo_agent() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            for (connection, stream) in listener.incoming().enumerate() {
                let stream = stream.unwrap();
                thread::spawn(move || {
                    let mut writer = stream.try_clone().unwrap();
                    for line in BufReader::new(stream).lines() {
                        let Ok(line) = line else { break };
                        if writeln!(writer, "conversation {connection}: {line}").is_err() {
                            break;
                        }
                    }
                });
            }
        });
        address
    }

    #[test]
    fn keeps_conversation_until_reset() {
        let address = echo_agent();
        let messenger = TcpMessenger::new();
        let timeout = Duration::from_secs(2);

        let first = messenger.talk_to_agent("hi", &address, "1/Aisha", true, timeout).unwrap();
        assert_eq!(first, "conversation 0: hi");
        let second = messenger.talk_to_agent("again", &address, "1/Aisha", false, timeout).unwrap();
        assert_eq!(second, "conversation 0: again");
        let fresh = messenger.talk_to_agent("new", &address, "1/Aisha", true, timeout).unwrap();
        assert_eq!(fresh, "conversation 1: new");
    }

    #[test]
    fn interleaved_conversations_keep_their_own_stream() {
        let address = echo_agent();
        let messenger = TcpMessenger::new();
        let timeout = Duration::from_secs(2);
        let talk = |message: &str, conversation: &str, new: bool| {
            messenger
                .talk_to_agent(message, &address, conversation, new, timeout)
                .unwrap()
        };

        assert_eq!(talk("A background", "1/Aisha", true), "conversation 0: A background");
        assert_eq!(talk("B background", "2/Aisha", true), "conversation 1: B background");
        assert_eq!(talk("A chat", "1/Aisha", false), "conversation 0: A chat");
        assert_eq!(talk("B chat", "2/Aisha", false), "conversation 1: B chat");

        // same agent, two seats of one instance
        assert_eq!(talk("C background", "1/Boris", true), "conversation 2: C background");
        assert_eq!(talk("A act", "1/Aisha", false), "conversation 0: A act");
    }

    #[test]
    fn unreachable_agent_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        let messenger = TcpMessenger::new();
        assert!(messenger
            .talk_to_agent("hi", &address, "1/Aisha", true, Duration::from_millis(200))
            .is_err());
    }
}
