//! Built-in agent definitions
//!
//! Built-in agents:
//! - `calendar`: events and schedules
//! - `conversation`: small talk and everything unrouted (default, may delegate)
//! - `design`: reads design notes from the workspace
//! - `music`: playback and casting
//! - `smart_home`: lights and devices
//! - `timer`: timers and alarms
//! - `weather`: current conditions and forecasts
//!
//! Each agent is data only; the prompts here are short working defaults and
//! can be replaced from YAML (see `config_loader`).

use super::config::{AgentConfig, PromptStyle};
use std::collections::HashMap;

/// Command action that hands the conversation to another agent
pub const DELEGATE_ACTION: &str = "delegate";

/// Get all built-in agents
pub fn get_builtin_agents() -> HashMap<String, AgentConfig> {
    [
        calendar(),
        conversation(),
        design(),
        music(),
        smart_home(),
        timer(),
        weather(),
    ]
    .into_iter()
    .map(|agent| (agent.name.clone(), agent))
    .collect()
}

pub fn calendar() -> AgentConfig {
    AgentConfig::builtin("calendar")
        .with_display_name("Calendar")
        .with_description("Reads and edits the household calendar.")
        .with_prompt(CALENDAR_PROMPT)
        .with_temperature(0.3)
        .with_tools(["now"])
        .with_services(["calendar"])
        .with_commands(
            "calendar",
            ["calendar_list", "calendar_create", "calendar_delete"],
        )
        .with_history_window(6)
        .with_keywords([
            "calendar", "schedule", "event", "events", "meeting", "appointment", "agenda",
        ])
}

pub fn conversation() -> AgentConfig {
    AgentConfig::builtin("conversation")
        .with_display_name("BMO")
        .with_description("Chats, answers questions, and hands off to specialists.")
        .with_prompt(CONVERSATION_PROMPT)
        .with_temperature(0.8)
        .with_history_window(10)
        .with_nesting(true)
        .with_keywords(["hello", "hi", "hey", "thanks", "joke", "story"])
}

pub fn design() -> AgentConfig {
    AgentConfig::builtin("design")
        .with_display_name("Design")
        .with_description("Looks through design notes and files in the workspace.")
        .with_prompt(DESIGN_PROMPT)
        .with_temperature(0.4)
        .with_prompt_style(PromptStyle::ToolListing)
        .with_tools(["read_file", "list_directory"])
        .with_max_turns(4)
        .with_history_window(6)
        .with_keywords(["design", "sketch", "drawing", "file", "files", "notes", "folder"])
}

pub fn music() -> AgentConfig {
    AgentConfig::builtin("music")
        .with_display_name("Music")
        .with_description("Plays music and casts to the TV.")
        .with_prompt(MUSIC_PROMPT)
        .with_temperature(0.7)
        .with_services(["music", "tv"])
        .with_commands(
            "music",
            ["music_play", "music_pause", "music_resume", "music_next", "music_volume"],
        )
        .with_commands("tv", ["tv_cast"])
        .with_history_window(4)
        .with_keywords(["music", "play", "song", "songs", "playlist", "album", "volume", "pause"])
}

pub fn smart_home() -> AgentConfig {
    AgentConfig::builtin("smart_home")
        .with_display_name("Smart Home")
        .with_description("Controls lights, plugs, and the TV.")
        .with_prompt(SMART_HOME_PROMPT)
        .with_temperature(0.3)
        .with_services(["smart_home", "tv"])
        .with_commands(
            "smart_home",
            ["lights_on", "lights_off", "lights_color", "device_toggle"],
        )
        .with_commands("tv", ["tv_power", "tv_input"])
        .with_history_window(4)
        .with_keywords(["light", "lights", "lamp", "plug", "tv", "television", "dim", "brightness"])
}

pub fn timer() -> AgentConfig {
    AgentConfig::builtin("timer")
        .with_display_name("Timer")
        .with_description("Sets timers and alarms.")
        .with_prompt(TIMER_PROMPT)
        .with_temperature(0.2)
        .with_services(["timers"])
        .with_commands(
            "timers",
            ["timer_set", "timer_cancel", "timer_list", "alarm_set"],
        )
        .with_history_window(4)
        .with_keywords(["timer", "timers", "alarm", "remind", "minutes", "countdown"])
}

pub fn weather() -> AgentConfig {
    AgentConfig::builtin("weather")
        .with_display_name("Weather")
        .with_description("Reports the weather and forecast.")
        .with_prompt(WEATHER_PROMPT)
        .with_temperature(0.5)
        .with_tools(["now"])
        .with_services(["weather"])
        .with_commands("weather", ["weather_current", "weather_forecast"])
        .with_history_window(4)
        .with_keywords(["weather", "forecast", "rain", "temperature", "sunny", "snow", "umbrella"])
}

macro_rules! persona {
    () => {
        "You are BMO, a small, cheerful living video game console who helps around the house. \
Keep replies short and friendly. You may add one presentation tag such as [FACE:happy] or [EMOTION:excited]."
    };
}

const CALENDAR_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou look after the household calendar. Check the current time with the `now` tool before \
reasoning about \"today\" or \"tomorrow\". Confirm what you changed in one sentence."
);

const CONVERSATION_PROMPT: &str = concat!(
    persona!(),
    "\n\nIf the user asks for something another helper does better (calendar, design, music, smart_home, \
timer, weather), hand it over with a command block:
```command
{\"action\": \"delegate\", \"params\": {\"agent\": \"timer\", \"message\": \"set a 10 minute timer\"}}
```
Otherwise just chat."
);

const DESIGN_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou help with design notes and sketches stored in the workspace. You can use these tools:
{tool_list}

Look before you answer. Never guess at file contents."
);

const MUSIC_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou are the house DJ. Start, pause, and skip music, change the volume, or cast to the TV."
);

const SMART_HOME_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou control the lights, smart plugs, and the TV. Only act on devices the user named."
);

const TIMER_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou set and cancel timers and alarms. Durations go in `minutes`; give each timer a short `label`."
);

const WEATHER_PROMPT: &str = concat!(
    persona!(),
    "\n\nYou report the weather. Use the `now` tool when the user asks about a relative day."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_agents_exist() {
        let agents = get_builtin_agents();
        let mut names: Vec<_> = agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["calendar", "conversation", "design", "music", "smart_home", "timer", "weather"]
        );
        assert!(agents.values().all(|a| a.built_in));
    }

    #[test]
    fn test_capability_table() {
        let agents = get_builtin_agents();
        let row = |name: &str| {
            let a = &agents[name];
            (
                a.tools.iter().map(String::as_str).collect::<Vec<_>>(),
                a.services.iter().map(String::as_str).collect::<Vec<_>>(),
                a.history_window,
                a.can_nest,
            )
        };

        assert_eq!(row("calendar"), (vec!["now"], vec!["calendar"], 6, false));
        assert_eq!(row("conversation"), (vec![], vec![], 10, true));
        assert_eq!(row("design"), (vec!["read_file", "list_directory"], vec![], 6, false));
        assert_eq!(row("music"), (vec![], vec!["music", "tv"], 4, false));
        assert_eq!(row("smart_home"), (vec![], vec!["smart_home", "tv"], 4, false));
        assert_eq!(row("timer"), (vec![], vec!["timers"], 4, false));
        assert_eq!(row("weather"), (vec!["now"], vec!["weather"], 4, false));
    }

    #[test]
    fn test_builtins_validate() {
        let tools = ["now", "read_file", "list_directory"];
        let services = ["calendar", "music", "smart_home", "timers", "tv", "weather"];
        for agent in get_builtin_agents().values() {
            agent.validate(&tools, &services).unwrap();
        }
    }

    #[test]
    fn test_prompts_share_persona() {
        for agent in get_builtin_agents().values() {
            assert!(agent.system_prompt.starts_with(persona!()), "{}", agent.name);
        }
    }

    #[test]
    fn test_only_design_lists_tools() {
        let agents = get_builtin_agents();
        for agent in agents.values() {
            let expected = if agent.name == "design" {
                PromptStyle::ToolListing
            } else {
                PromptStyle::Plain
            };
            assert_eq!(agent.prompt_style, expected, "{}", agent.name);
        }
        assert!(agents["conversation"].system_prompt.contains(DELEGATE_ACTION));
    }
}
