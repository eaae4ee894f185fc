// Command types - control thread -> scheduler thread

use crate::sequencer::animation::TimelineId;
use crate::sequencer::player::PlayMode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetronomeCommand {
    SetTempo(f64),
    SetVolume(f32),
    SetMuted(bool),
    SetAnalog(bool),
    SetMode(PlayMode),
    /// Tap tempo at a wall-clock time (ms)
    Tap(f64),
    /// Raise the tempo by the speed training percentage
    Accelerate,
    /// Cycle the accent of a circle position
    ToggleAccent { circle: usize, index: usize },
    /// Cycle the accent of a polyrhythm position
    TogglePolyAccent { timeline: TimelineId, index: usize },
    /// Append a circle with this many subdivisions
    AddCircle(usize),
    RemoveCircle(usize),
    /// Start from beat 1 of the first circle
    Start,
    Pause,
    Resume,
    Stop,
    Quit,
}

impl MetronomeCommand {
    /// Parse one line of the interactive console
    pub fn parse(line: &str, now_ms: f64) -> Option<Self> {
        let mut words = line.split_whitespace();
        let cmd = words.next()?.to_ascii_lowercase();
        let arg = words.next();

        match cmd.as_str() {
            "bpm" | "tempo" => arg?.parse().ok().map(MetronomeCommand::SetTempo),
            "vol" | "volume" => arg?.parse().ok().map(MetronomeCommand::SetVolume),
            "mute" => Some(MetronomeCommand::SetMuted(true)),
            "unmute" => Some(MetronomeCommand::SetMuted(false)),
            "analog" => Some(MetronomeCommand::SetAnalog(arg != Some("off"))),
            "mode" => match arg? {
                "single" => Some(MetronomeCommand::SetMode(PlayMode::Single)),
                "multi" | "multi_circle" => Some(MetronomeCommand::SetMode(PlayMode::MultiCircle)),
                "poly" | "polyrhythm" => Some(MetronomeCommand::SetMode(PlayMode::Polyrhythm)),
                _ => None,
            },
            "t" | "tap" => Some(MetronomeCommand::Tap(now_ms)),
            "+" | "faster" => Some(MetronomeCommand::Accelerate),
            "accent" => {
                let circle = arg?.parse().ok()?;
                let index = words.next()?.parse().ok()?;
                Some(MetronomeCommand::ToggleAccent { circle, index })
            }
            "poly" => {
                let timeline = match arg? {
                    "inner" | "i" => TimelineId::Inner,
                    "outer" | "o" => TimelineId::Outer,
                    _ => return None,
                };
                let index = words.next()?.parse().ok()?;
                Some(MetronomeCommand::TogglePolyAccent { timeline, index })
            }
            "add" => arg?.parse().ok().map(MetronomeCommand::AddCircle),
            "remove" | "rm" => arg?.parse().ok().map(MetronomeCommand::RemoveCircle),
            "s" | "start" | "play" => Some(MetronomeCommand::Start),
            "p" | "pause" => Some(MetronomeCommand::Pause),
            "r" | "resume" => Some(MetronomeCommand::Resume),
            "stop" => Some(MetronomeCommand::Stop),
            "q" | "quit" | "exit" => Some(MetronomeCommand::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            MetronomeCommand::parse("bpm 96", 0.0),
            Some(MetronomeCommand::SetTempo(96.0))
        );
        assert_eq!(
            MetronomeCommand::parse("tap", 1234.0),
            Some(MetronomeCommand::Tap(1234.0))
        );
        assert_eq!(
            MetronomeCommand::parse("mode poly", 0.0),
            Some(MetronomeCommand::SetMode(PlayMode::Polyrhythm))
        );
        assert_eq!(
            MetronomeCommand::parse("accent 0 2", 0.0),
            Some(MetronomeCommand::ToggleAccent { circle: 0, index: 2 })
        );
        assert_eq!(
            MetronomeCommand::parse("analog off", 0.0),
            Some(MetronomeCommand::SetAnalog(false))
        );
        assert_eq!(MetronomeCommand::parse("Q", 0.0), Some(MetronomeCommand::Quit));
    }

    #[test]
    fn test_parse_transport_and_circle_commands() {
        assert_eq!(MetronomeCommand::parse("play", 0.0), Some(MetronomeCommand::Start));
        assert_eq!(MetronomeCommand::parse("start", 0.0), Some(MetronomeCommand::Start));
        assert_eq!(
            MetronomeCommand::parse("poly outer 3", 0.0),
            Some(MetronomeCommand::TogglePolyAccent {
                timeline: TimelineId::Outer,
                index: 3
            })
        );
        assert_eq!(
            MetronomeCommand::parse("poly i 0", 0.0),
            Some(MetronomeCommand::TogglePolyAccent {
                timeline: TimelineId::Inner,
                index: 0
            })
        );
        assert_eq!(
            MetronomeCommand::parse("add 5", 0.0),
            Some(MetronomeCommand::AddCircle(5))
        );
        assert_eq!(
            MetronomeCommand::parse("remove 1", 0.0),
            Some(MetronomeCommand::RemoveCircle(1))
        );
        assert_eq!(MetronomeCommand::parse("poly middle 1", 0.0), None);
        assert_eq!(MetronomeCommand::parse("poly outer", 0.0), None);
        assert_eq!(MetronomeCommand::parse("add", 0.0), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(MetronomeCommand::parse("", 0.0), None);
        assert_eq!(MetronomeCommand::parse("bpm fast", 0.0), None);
        assert_eq!(MetronomeCommand::parse("mode grid", 0.0), None);
        assert_eq!(MetronomeCommand::parse("dance", 0.0), None);
    }
}
