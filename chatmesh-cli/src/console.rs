//! Line-oriented console: parse commands from stdin, print events as they arrive.

use std::future::Future;

use chatmesh_core::{ChatMessage, Directory, Event, EventReceiver, PeerAddress, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
commands:
  <text>          send to the focused channel
  /join C         join channel C
  /focus C        focus joined channel C
  /channels       list joined channels
  /peers          list other registered peers
  /history        show focused channel history
  /dm ADDR        select direct conversation with ADDR (no ADDR clears)
  /send TEXT      direct message to the selected peer
  /quit           exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Join(String),
    Focus(String),
    Channels,
    Peers,
    History,
    Dm(Option<PeerAddress>),
    Send(String),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Command::Say(line.to_string()));
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((n, a)) => (n, a.trim()),
            None => (rest, ""),
        };
        let need = |what: &str| {
            if arg.is_empty() {
                Err(format!("usage: /{name} {what}"))
            } else {
                Ok(arg.to_string())
            }
        };
        match name {
            "join" => need("CHANNEL").map(Command::Join),
            "focus" => need("CHANNEL").map(Command::Focus),
            "channels" => Ok(Command::Channels),
            "peers" => Ok(Command::Peers),
            "history" => Ok(Command::History),
            "dm" if arg.is_empty() => Ok(Command::Dm(None)),
            "dm" => arg
                .parse::<PeerAddress>()
                .map(|a| Command::Dm(Some(a)))
                .map_err(|e| format!("{e}")),
            "send" => need("TEXT").map(Command::Send),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command /{other} (try /help)")),
        }
    }
}

/// `[HH:MM:SS] user: text`, falling back to the raw timestamp.
pub fn format_message(msg: &ChatMessage) -> String {
    let when = msg
        .sent_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| msg.timestamp.clone());
    format!("[{when}] {}: {}", msg.username, msg.message)
}

fn print_history(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("(no messages)");
    }
    for m in messages {
        println!("{}", format_message(m));
    }
}

/// One line per registered peer other than `me`.
pub fn peer_lines(directory: &Directory, me: Option<&PeerAddress>) -> Vec<String> {
    let lines: Vec<String> = directory
        .others(me)
        .map(|p| format!("  {} {}", p.username, p.address))
        .collect();
    if lines.is_empty() {
        return vec!["(no other peers)".to_string()];
    }
    lines
}

/// Lines to print for an event.
pub fn render_event(event: &Event) -> Vec<String> {
    match event {
        Event::Notify(n) => vec![format!("* {}: {}", n.title, n.body)],
        Event::Warning(n) => vec![format!("! {}: {}", n.title, n.body)],
        Event::ChannelsChanged => Vec::new(),
        Event::ChannelMessages { channel, messages } => messages
            .last()
            .map(|m| vec![format!("#{channel} {}", format_message(m))])
            .unwrap_or_default(),
        Event::DirectMessages { peer, messages } => messages
            .last()
            .map(|m| vec![format!("@{peer} {}", format_message(m))])
            .unwrap_or_default(),
    }
}

/// Run until `/quit`, end of input or `shutdown` resolves.
pub async fn run(
    session: &Session,
    mut events: EventReceiver,
    shutdown: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tokio::pin!(shutdown);
    println!("type /help for commands");
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(cmd) => execute(session, cmd).await,
                    Err(usage) => println!("{usage}"),
                },
                None => {
                    debug!("stdin closed");
                    break;
                }
            },
            Some(event) = events.recv() => {
                for line in render_event(&event) {
                    println!("{line}");
                }
            }
            result = &mut shutdown => {
                result?;
                break;
            }
        }
    }
    Ok(())
}

/// Run one command, printing its result. Session errors are reported, not fatal.
async fn execute(session: &Session, cmd: Command) {
    let result = match cmd {
        Command::Say(text) => {
            let channel = session.focused_channel().await;
            session
                .send_channel_message(&channel, &text)
                .await
                .map(|report| {
                    if !report.is_complete() {
                        println!("(not delivered to {} member(s))", report.failed.len());
                    }
                })
        }
        Command::Join(channel) => session.join_channel(&channel).await.map(|outcome| {
            println!(
                "joined #{} ({} members)",
                channel.trim_start_matches('#'),
                outcome.roster.member_count
            );
        }),
        Command::Focus(channel) => session
            .select_channel(&channel)
            .await
            .map(|history| print_history(&history)),
        Command::Channels => {
            for c in session.channels().await {
                let marker = if c.focused { ">" } else { " " };
                println!(
                    "{marker} #{} ({} members, {} unread)",
                    c.name,
                    c.members.len(),
                    c.unread
                );
            }
            Ok(())
        }
        Command::Peers => {
            let me = session.address().await;
            session.discover_peers().await.map(|discovery| {
                if let Some(at) = discovery.cached_at {
                    println!("(cached list from {})", at.format("%Y-%m-%d %H:%M:%S UTC"));
                }
                for line in peer_lines(&discovery.directory, me.as_ref()) {
                    println!("{line}");
                }
            })
        }
        Command::History => {
            let channel = session.focused_channel().await;
            session
                .load_messages(&channel)
                .await
                .map(|history| print_history(&history))
        }
        Command::Dm(peer) => {
            let selected = peer.is_some();
            session.select_direct_peer(peer).await.map(|history| {
                if selected {
                    print_history(&history);
                } else {
                    println!("direct conversation closed");
                }
            })
        }
        Command::Send(text) => match session.direct_target().await {
            Some(peer) => session.send_direct_message(&peer, &text).await.map(|_| ()),
            None => {
                println!("select a peer with /dm ADDR first");
                Ok(())
            }
        },
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => Ok(()),
    };
    if let Err(e) = result {
        println!("error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use chatmesh_core::{Notification, Peer};

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("hello all"), Ok(Command::Say("hello all".into())));
        assert_eq!(Command::parse("/join  random "), Ok(Command::Join("random".into())));
        assert_eq!(Command::parse("/channels"), Ok(Command::Channels));
        assert_eq!(Command::parse("/dm"), Ok(Command::Dm(None)));
        assert_eq!(
            Command::parse("/dm 10.0.0.2:7001"),
            Ok(Command::Dm(Some("10.0.0.2:7001".parse().unwrap())))
        );
        assert_eq!(Command::parse("/send hi there"), Ok(Command::Send("hi there".into())));
        assert_eq!(Command::parse("/quit"), Ok(Command::Quit));
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(Command::parse("/join").is_err());
        assert!(Command::parse("/dm nowhere").is_err());
        assert!(Command::parse("/frobnicate").is_err());
    }

    #[test]
    fn formats_message_time() {
        let msg = ChatMessage {
            from: None,
            username: "bob".into(),
            message: "hi".into(),
            timestamp: "2025-11-05T10:30:15.123456".into(),
        };
        assert_eq!(format_message(&msg), "[10:30:15] bob: hi");
        let odd = ChatMessage {
            timestamp: "yesterday".into(),
            ..msg
        };
        assert_eq!(format_message(&odd), "[yesterday] bob: hi");
    }

    #[test]
    fn renders_notifications() {
        let lines = render_event(&Event::Notify(Notification::new("New Direct Message", "bob: hi")));
        assert_eq!(lines, vec!["* New Direct Message: bob: hi".to_string()]);
        assert!(render_event(&Event::ChannelsChanged).is_empty());
    }

    #[test]
    fn peer_list_skips_own_address() {
        let me: PeerAddress = "10.0.0.1:7000".parse().unwrap();
        let directory = Directory {
            peers: vec![
                Peer {
                    username: "alice".into(),
                    address: me.clone(),
                },
                Peer {
                    username: "bob".into(),
                    address: "10.0.0.2:7001".parse().unwrap(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(peer_lines(&directory, Some(&me)), vec!["  bob 10.0.0.2:7001".to_string()]);
        assert_eq!(peer_lines(&directory, None).len(), 2);

        let alone = Directory {
            peers: vec![Peer {
                username: "alice".into(),
                address: me.clone(),
            }],
            ..Default::default()
        };
        assert_eq!(peer_lines(&alone, Some(&me)), vec!["(no other peers)".to_string()]);
    }
}
