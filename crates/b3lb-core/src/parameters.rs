//! Parameter policy data: per-endpoint whitelists and per-parameter value
//! validation regexes, ported from the reference implementation's
//! `PARAMETERS_CREATE` / `PARAMETERS_JOIN` / `PARAMETER_REGEXES` tables.

use regex::Regex;
use std::sync::OnceLock;

fn boolean_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(true|false)$").unwrap())
}

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

fn color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#[a-fA-F0-9]{6}$").unwrap())
}

fn locale_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z]{2}$").unwrap())
}

fn role_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(VIEWER|MODERATOR)$").unwrap())
}

fn guest_policy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(ALWAYS_ACCEPT|ALWAYS_DENY|ASK_MODERATOR)$").unwrap())
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://\S+$").unwrap())
}

fn any_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".*").unwrap())
}

/// Returns the validation regex for a given parameter name, falling back
/// to the catch-all `.*` for parameters with no dedicated format.
pub fn regex_for_parameter(name: &str) -> &'static Regex {
    match name {
        "record" | "autoStartRecording" | "allowStartStopRecording" | "muteOnStart"
        | "webcamsOnlyForModerator" | "lockSettingsDisableCam" | "lockSettingsDisableMic"
        | "lockSettingsDisablePrivateChat" | "lockSettingsDisablePublicChat"
        | "lockSettingsDisableNote" | "lockSettingsLockOnJoin" | "breakoutRoomsEnabled"
        | "allowModsToUnmuteUsers" | "excludeFromDashboard" | "endWhenNoModerator" => {
            boolean_regex()
        }
        "maxParticipants" | "duration" | "meetingLayout" | "logoutTimer" => number_regex(),
        "guestPolicy" => guest_policy_regex(),
        "bannerColor" => color_regex(),
        "userdata-bbb_display_branding_area" => boolean_regex(),
        "userdata-bbb_locale" => locale_regex(),
        "role" => role_regex(),
        "logoutURL" | "endCallbackUrl" | "meta_endCallbackUrl" | "meta_bbb-recording-ready-url"
        | "userdata-bbb_custom_style_url" => url_regex(),
        _ => any_regex(),
    }
}

/// Parameters accepted by the `create` endpoint whitelist. Anything else
/// falls through BLOCK/SET/OVERRIDE policy evaluation undisturbed (the
/// whitelist only gates which *configured* Parameter rows apply).
pub const PARAMETERS_CREATE: &[&str] = &[
    "name",
    "meetingID",
    "attendeePW",
    "moderatorPW",
    "welcome",
    "dialNumber",
    "voiceBridge",
    "webVoice",
    "logoutURL",
    "maxParticipants",
    "record",
    "duration",
    "isBreakout",
    "moderatorOnlyMessage",
    "autoStartRecording",
    "allowStartStopRecording",
    "webcamsOnlyForModerator",
    "logoURL",
    "bannerText",
    "bannerColor",
    "muteOnStart",
    "lockSettingsDisableCam",
    "lockSettingsDisableMic",
    "lockSettingsDisablePrivateChat",
    "lockSettingsDisablePublicChat",
    "lockSettingsDisableNote",
    "lockSettingsLockOnJoin",
    "guestPolicy",
    "meta_endCallbackUrl",
    "meta_bbb-recording-ready-url",
    "endWhenNoModerator",
];

/// Parameters unconditionally dropped from `create` regardless of tenant
/// Parameter configuration.
pub const CREATE_FORCE_DROP: &[&str] = &["dialNumber", "voiceBridge"];

/// Parameters accepted by the `join` endpoint whitelist.
pub const PARAMETERS_JOIN: &[&str] = &[
    "fullName",
    "meetingID",
    "password",
    "redirect",
    "userID",
    "webVoiceConf",
    "configToken",
    "defaultLayout",
    "avatarURL",
    "role",
    "excludeFromDashboard",
    "userdata-bbb_custom_style_url",
    "userdata-bbb_locale",
    "userdata-bbb_display_branding_area",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_regex_rejects_garbage() {
        assert!(boolean_regex().is_match("true"));
        assert!(boolean_regex().is_match("false"));
        assert!(!boolean_regex().is_match("yes"));
    }

    #[test]
    fn color_regex_matches_hex() {
        assert!(color_regex().is_match("#1a2b3c"));
        assert!(!color_regex().is_match("blue"));
    }

    #[test]
    fn regex_for_parameter_falls_back_to_any() {
        let re = regex_for_parameter("some-unknown-param");
        assert!(re.is_match("anything at all"));
    }

    #[test]
    fn create_force_drop_contains_dial_params() {
        assert!(CREATE_FORCE_DROP.contains(&"dialNumber"));
        assert!(CREATE_FORCE_DROP.contains(&"voiceBridge"));
    }
}
