use crate::command::{Command, LINE_ENDING};
use crate::config::Presentation;
use std::time::Duration;

/// One step of the live run of a single command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Show exactly this many bytes of program output before input line `line`
    Relay { line: usize, bytes: usize },

    /// Send input directly to the program (instant, not visible)
    Send(Vec<u8>),

    /// Show text to the viewer as if it were being typed
    TypeText {
        text: String,
        min_delay: Duration,
        max_delay: Duration,
    },

    /// Pause execution
    Sleep(Duration),

    /// Close the program's stdin
    CloseInput,

    /// Show all remaining program output until it closes stdout
    Drain,
}

impl Event {
    /// Create a Send event for one input line, terminator included
    pub fn send_line(line: &str) -> Self {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(LINE_ENDING.as_bytes());
        Event::Send(bytes)
    }

    /// Create a TypeText event with the configured typing speed
    pub fn type_text(text: impl Into<String>, presentation: &Presentation) -> Self {
        Event::TypeText {
            text: text.into(),
            min_delay: presentation.min_type_delay,
            max_delay: presentation.max_type_delay,
        }
    }
}

/// Build the live plan for `command` using its byte-size table `sizes`.
///
/// Input reaches the program before it is typed on screen; the typing is
/// only for the viewer.
pub fn script(command: &Command, sizes: &[usize], presentation: &Presentation) -> Vec<Event> {
    let mut events = Vec::with_capacity(command.input_lines().len() * 5 + 2);

    for (line, (input, &bytes)) in command.input_lines().iter().zip(sizes).enumerate() {
        events.push(Event::Relay { line, bytes });
        events.push(Event::send_line(input));
        events.push(Event::Sleep(presentation.input_pause));
        events.push(Event::type_text(format!("{input}{LINE_ENDING}"), presentation));
        events.push(Event::Sleep(presentation.after_input_pause));
    }

    events.push(Event::CloseInput);
    events.push(Event::Drain);
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> Presentation {
        Presentation::instant()
    }

    #[test]
    fn test_no_input_only_drains() {
        let events = script(&Command::new("echo hello"), &[], &instant());
        assert_eq!(events, vec![Event::CloseInput, Event::Drain]);
    }

    #[test]
    fn test_line_echo_plan() {
        let command = Command::new("echo-lines").with_input(["a", "b"]);
        let presentation = instant();
        let events = script(&command, &[0, 7], &presentation);

        let relays: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Relay { .. } | Event::Send(_) | Event::Drain))
            .cloned()
            .collect();
        assert_eq!(
            relays,
            vec![
                Event::Relay { line: 0, bytes: 0 },
                Event::send_line("a"),
                Event::Relay { line: 1, bytes: 7 },
                Event::send_line("b"),
                Event::Drain,
            ]
        );
    }

    #[test]
    fn test_input_is_sent_before_it_is_typed() {
        let command = Command::new("cat").with_input(["hi"]);
        let events = script(&command, &[0], &instant());
        let sent = events.iter().position(|e| matches!(e, Event::Send(_))).unwrap();
        let typed = events
            .iter()
            .position(|e| matches!(e, Event::TypeText { .. }))
            .unwrap();
        assert!(sent < typed);
        assert_eq!(
            events[typed],
            Event::TypeText {
                text: format!("hi{LINE_ENDING}"),
                min_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            }
        );
    }

    #[test]
    fn test_pauses_follow_presentation() {
        let presentation = Presentation {
            input_pause: Duration::from_millis(500),
            after_input_pause: Duration::from_millis(200),
            ..Presentation::instant()
        };
        let command = Command::new("cat").with_input(["x"]);
        let sleeps: Vec<_> = script(&command, &[0], &presentation)
            .into_iter()
            .filter_map(|e| match e {
                Event::Sleep(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(
            sleeps,
            vec![Duration::from_millis(500), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_send_line_appends_terminator() {
        match Event::send_line("cmd") {
            Event::Send(bytes) => assert!(bytes.ends_with(LINE_ENDING.as_bytes())),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
