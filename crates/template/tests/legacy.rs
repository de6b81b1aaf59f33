//! Tests for the legacy turn-walking render path.

use tcore::Message;
use template::{collate, Template, Values};

const TURN: &str = "{{ if .System }}S:{{ .System }}\n{{ end }}U:{{ .Prompt }}\nA:{{ .Response }}\n";

fn render(source: &str, values: &Values) -> String {
    let tmpl = Template::parse(source).unwrap();
    let mut out = String::new();
    tmpl.execute(&mut out, values).unwrap();
    out
}

#[test]
fn single_turn_omits_empty_response() {
    let out = render(
        TURN,
        &Values {
            messages: vec![Message::user("hi")],
            ..Values::default()
        },
    );
    // The final pass drops the response action so the completion can start
    // right after the assistant marker.
    assert_eq!(out, "U:hi\nA:");
}

#[test]
fn completed_turns_flush_in_full() {
    let out = render(
        TURN,
        &Values {
            messages: vec![
                Message::user("hi"),
                Message::assistant("hello"),
                Message::user("bye"),
            ],
            ..Values::default()
        },
    );
    assert_eq!(out, "U:hi\nA:hello\nU:bye\nA:");
}

#[test]
fn mid_conversation_system_flushes_pending_turn() {
    let out = render(
        TURN,
        &Values {
            messages: vec![
                Message::user("u1"),
                Message::assistant("a1"),
                Message::system("s2"),
                Message::user("u2"),
            ],
            ..Values::default()
        },
    );
    assert_eq!(out, "U:u1\nA:a1\nS:s2\nU:u2\nA:");
}

#[test]
fn system_attaches_to_following_turn() {
    let out = render(
        TURN,
        &Values {
            messages: vec![Message::system("sys"), Message::user("hi")],
            ..Values::default()
        },
    );
    assert_eq!(out, "S:sys\nU:hi\nA:");
}

#[test]
fn force_legacy_wins_over_message_templates() {
    let out = render(
        "{{ range .Messages }}[{{ .Content }}]{{ end }}{{ .Response }}",
        &Values {
            messages: vec![Message::user("hi")],
            force_legacy: true,
            ..Values::default()
        },
    );
    // The legacy scope carries no Messages, so the range renders nothing and
    // the trimmed final pass drops the response.
    assert_eq!(out, "");
}

#[test]
fn tool_messages_are_skipped_in_legacy_walk() {
    let out = render(
        TURN,
        &Values {
            messages: vec![
                Message::user("hi"),
                Message::tool("{\"result\": 3}"),
            ],
            ..Values::default()
        },
    );
    assert_eq!(out, "U:hi\nA:");
}

#[test]
fn collate_merges_consecutive_roles() {
    let (system, collated) = collate(&[
        Message::system("a"),
        Message::system("b"),
        Message::user("u1"),
        Message::user("u2"),
        Message::assistant("r"),
    ]);
    assert_eq!(system, "a\n\nb");
    assert_eq!(collated.len(), 3);
    assert_eq!(collated[0].content, "a\n\nb");
    assert_eq!(collated[1].content, "u1\n\nu2");
    assert_eq!(collated[2].content, "r");
}

#[test]
fn collate_is_idempotent() {
    let (_, collated) = collate(&[
        Message::system("a"),
        Message::user("u1"),
        Message::user("u2"),
        Message::assistant("r"),
        Message::user("u3"),
    ]);
    let (_, again) = collate(&collated);
    assert_eq!(collated, again);
}

#[test]
fn response_removal_drops_following_siblings() {
    let out = render(
        "A{{ .Response }}B",
        &Values {
            messages: vec![Message::user("x")],
            ..Values::default()
        },
    );
    // Everything after the response action belongs to the completed turn
    // shape and is cut from the final pass.
    assert_eq!(out, "A");
}
