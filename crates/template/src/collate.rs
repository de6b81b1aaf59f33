//! Message collation ahead of rendering

use tcore::{Message, Role};

/// Merge a raw message sequence for templating.
///
/// All system contents are joined with `"\n\n"` into a single system string;
/// consecutive messages with the same role collapse into one, their contents
/// joined the same way. System messages stay in the collated list so
/// message-aware templates can render them in place. Idempotent on its own
/// output.
pub fn collate(msgs: &[Message]) -> (String, Vec<Message>) {
    let mut system = Vec::new();
    let mut collated: Vec<Message> = Vec::new();

    for msg in msgs {
        if msg.role == Role::System {
            system.push(msg.content.clone());
        }

        match collated.last_mut() {
            Some(last) if last.role == msg.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
                last.images.extend(msg.images.iter().cloned());
                last.tool_calls.extend(msg.tool_calls.iter().cloned());
            }
            _ => collated.push(msg.clone()),
        }
    }

    (system.join("\n\n"), collated)
}
