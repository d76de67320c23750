//! Terminal client
//!
//! One task reads frames from the server: chat messages are printed right
//! away, every other frame is a reply and is handed to the menu loop, which
//! waits for exactly one reply per request it sends.

use std::error::Error;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::topic::{TopicInfo, TopicKind};
use crate::transport::message::{ClientMessage, ServerMessage};

type Input = Lines<BufReader<Stdin>>;

const MENU: &str = "Select the command:
1. List channels
2. Send message
3. Create group chat
4. Join group chat
5. Leave group chat
6. Disconnect
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    ListChannels,
    SendMessage,
    CreateGroup,
    JoinGroup,
    LeaveGroup,
    Disconnect,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(MenuChoice::ListChannels),
            "2" => Some(MenuChoice::SendMessage),
            "3" => Some(MenuChoice::CreateGroup),
            "4" => Some(MenuChoice::JoinGroup),
            "5" => Some(MenuChoice::LeaveGroup),
            "6" => Some(MenuChoice::Disconnect),
            _ => None,
        }
    }
}

/// Connect to `url` and run the menu until the user disconnects or the
/// server goes away. Prompts for a username when none is given.
pub async fn run_client(url: &str, username: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    let username = match username {
        Some(name) => name,
        None => prompt(&mut input, "Input the username and press enter:").await?,
    };

    let (ws_stream, _response) = connect_async(url).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let connect = ClientMessage::Connect { username };
    ws_sender
        .send(WsMessage::text(serde_json::to_string(&connect)?))
        .await?;

    let (replies_tx, mut replies) = mpsc::unbounded_channel::<ServerMessage>();
    let reader = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_receiver.next().await {
            let WsMessage::Text(text) = frame else {
                continue;
            };
            match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(msg @ ServerMessage::Message { .. }) => {
                    if let Some(line) = render_message(&msg) {
                        println!("{line}");
                    }
                }
                Ok(reply) => {
                    if replies_tx.send(reply).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Unreadable frame from server: {e}"),
            }
        }
        debug!("Server stream ended");
    });

    match replies.recv().await {
        Some(ServerMessage::Connected { username }) => println!("Connected as {username}"),
        Some(ServerMessage::Error { message }) => return Err(message.into()),
        Some(other) => return Err(format!("unexpected reply: {other:?}").into()),
        None => return Err("server closed the connection".into()),
    }

    loop {
        println!("{MENU}");
        let Some(choice) = MenuChoice::parse(&prompt(&mut input, "").await?) else {
            continue;
        };

        let request = match choice {
            MenuChoice::ListChannels => ClientMessage::ListTopics,
            MenuChoice::SendMessage => {
                let topic = prompt(&mut input, "Please, enter the message recipient:").await?;
                let text = prompt(&mut input, "Please, enter the message:").await?;
                ClientMessage::SendMessage { topic, text }
            }
            MenuChoice::CreateGroup => ClientMessage::CreateGroup {
                topic: prompt(&mut input, "Please, enter the group name:").await?,
            },
            MenuChoice::JoinGroup => ClientMessage::JoinGroup {
                topic: prompt(&mut input, "Please, enter the group chat name:").await?,
            },
            MenuChoice::LeaveGroup => ClientMessage::LeaveGroup {
                topic: prompt(&mut input, "Please, enter the group chat name:").await?,
            },
            MenuChoice::Disconnect => break,
        };

        ws_sender
            .send(WsMessage::text(serde_json::to_string(&request)?))
            .await?;

        let Some(reply) = replies.recv().await else {
            println!("Server disconnected");
            reader.abort();
            return Ok(());
        };
        println!("{}", describe_reply(&request, &reply));
    }

    let _ = ws_sender.close().await;
    reader.abort();
    println!("You are disconnected");
    Ok(())
}

async fn prompt(input: &mut Input, question: &str) -> Result<String, Box<dyn Error>> {
    if !question.is_empty() {
        println!("{question}");
    }
    match input.next_line().await? {
        Some(line) => Ok(line.trim_end_matches('\r').to_string()),
        None => Err("standard input closed".into()),
    }
}

/// One-line rendering of a delivered chat message.
pub fn render_message(msg: &ServerMessage) -> Option<String> {
    let ServerMessage::Message {
        text,
        author,
        topic,
        ..
    } = msg
    else {
        return None;
    };

    Some(match topic.kind {
        TopicKind::Personal => format!("New message. Text: {text}. Author: {author}"),
        TopicKind::Group => format!(
            "New message. Text: {text}. Group: {}. Author: {author}",
            topic.name
        ),
    })
}

pub fn render_topics(topics: &[TopicInfo]) -> String {
    let mut out = String::from("Channels list:\n");
    for topic in topics {
        let kind = match topic.kind {
            TopicKind::Personal => "personal",
            TopicKind::Group => "group",
        };
        out.push_str(&format!("name: {}, type: {kind}\n", topic.name));
    }
    out
}

/// What to tell the user once `reply` has come back for `request`.
pub fn describe_reply(request: &ClientMessage, reply: &ServerMessage) -> String {
    match (request, reply) {
        (_, ServerMessage::Error { message }) => message.clone(),
        (_, ServerMessage::Topics { topics }) => render_topics(topics),
        (ClientMessage::SendMessage { .. }, ServerMessage::Ok {}) => {
            "Message is sent successfully".to_string()
        }
        (ClientMessage::CreateGroup { .. }, ServerMessage::Ok {}) => {
            "Group is created successfully".to_string()
        }
        (ClientMessage::JoinGroup { topic }, ServerMessage::Ok {}) => {
            format!("Successfully joined group chat \"{topic}\"")
        }
        (ClientMessage::LeaveGroup { topic }, ServerMessage::Ok {}) => {
            format!("Successfully left group chat \"{topic}\"")
        }
        (_, other) => format!("Unexpected reply: {other:?}"),
    }
}
