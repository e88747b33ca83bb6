//! Minimal, hand-built XML for dynamic backend-protocol responses. Static
//! bodies live in `b3lb_core::canned`; this module only covers the
//! responses whose content depends on request data.

use b3lb_core::model::Meeting;

pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn create_success_xml(meeting_id: &str, attendee_pw: &str, moderator_pw: &str) -> String {
    format!(
        "<response>\r\n<returncode>SUCCESS</returncode>\r\n<meetingID>{}</meetingID>\r\n<internalMeetingID>{}</internalMeetingID>\r\n<attendeePW>{}</attendeePW>\r\n<moderatorPW>{}</moderatorPW>\r\n<createTime>{}</createTime>\r\n<hasBeenForciblyEnded>false</hasBeenForciblyEnded>\r\n<messageKey></messageKey>\r\n<message></message>\r\n</response>",
        xml_escape(meeting_id),
        xml_escape(meeting_id),
        xml_escape(attendee_pw),
        xml_escape(moderator_pw),
        chrono::Utc::now().timestamp_millis(),
    )
}

pub fn join_redirect_url(node_domain: &str, endpoint: &str, query_string: &str, checksum: &str) -> String {
    format!("https://{node_domain}/bigbluebutton/api/{endpoint}?{query_string}&checksum={checksum}")
}

pub fn is_meeting_running_xml(running: bool) -> String {
    format!(
        "<response>\r\n<returncode>SUCCESS</returncode>\r\n<running>{}</running>\r\n</response>",
        running
    )
}

pub fn meeting_info_xml(meeting: &Meeting) -> String {
    format!(
        "<response>\r\n<returncode>SUCCESS</returncode>\r\n<meetingID>{}</meetingID>\r\n<internalMeetingID>{}</internalMeetingID>\r\n<createTime>{}</createTime>\r\n<running>true</running>\r\n<participantCount>{}</participantCount>\r\n<listenerCount>{}</listenerCount>\r\n<voiceParticipantCount>{}</voiceParticipantCount>\r\n<moderatorCount>{}</moderatorCount>\r\n<videoCount>{}</videoCount>\r\n</response>",
        xml_escape(&meeting.id),
        xml_escape(&meeting.id),
        meeting.created_at.timestamp_millis(),
        meeting.attendees,
        meeting.listener_count,
        meeting.voice_participant_count,
        meeting.moderator_count,
        meeting.video_count,
    )
}

pub fn get_meetings_xml(meetings: &[Meeting]) -> String {
    if meetings.is_empty() {
        return b3lb_core::canned::GET_MEETINGS_NO_MEETINGS.to_string();
    }
    let body: String = meetings
        .iter()
        .map(|m| {
            format!(
                "<meeting>\r\n<meetingID>{}</meetingID>\r\n<internalMeetingID>{}</internalMeetingID>\r\n<participantCount>{}</participantCount>\r\n<running>true</running>\r\n</meeting>\r\n",
                xml_escape(&m.id),
                xml_escape(&m.id),
                m.attendees,
            )
        })
        .collect();
    format!(
        "<response>\r\n<returncode>SUCCESS</returncode>\r\n<meetings>\r\n{}</meetings>\r\n</response>",
        body
    )
}

/// Splits a raw (still percent-encoded) query string into the part used for
/// checksum verification — every segment except `checksum` and
/// `checksumHash`, joined back with `&` using the client's literal bytes —
/// plus the two extracted values.
pub fn strip_checksum(raw_query: &str) -> (String, Option<String>, Option<String>) {
    let mut checksum = None;
    let mut checksum_hash = None;
    let mut kept = Vec::new();

    for segment in raw_query.split('&').filter(|s| !s.is_empty()) {
        let mut parts = segment.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        match key {
            "checksum" => checksum = Some(value.to_string()),
            "checksumHash" => {
                checksum_hash = urlencoding::decode(value).ok().map(|v| v.into_owned())
            }
            _ => kept.push(segment),
        }
    }

    (kept.join("&"), checksum, checksum_hash)
}

/// Decodes a raw query string into ordered `(key, value)` pairs, as they
/// arrive over the wire (order matters for checksum verification, so this
/// never collects into a `HashMap`).
pub fn parse_query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| {
            let mut parts = segment.splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next().unwrap_or("");
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_reserved_xml_characters() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn parses_ordered_query_pairs() {
        let pairs = parse_query_pairs("name=Test%20Room&meetingID=abc");
        assert_eq!(
            pairs,
            vec![
                ("name".to_string(), "Test Room".to_string()),
                ("meetingID".to_string(), "abc".to_string()),
            ]
        );
    }

    #[test]
    fn strip_checksum_removes_auth_params_only() {
        let (query, checksum, hash) =
            strip_checksum("name=Test%20Room&checksumHash=sha256&meetingID=abc&checksum=deadbeef");
        assert_eq!(query, "name=Test%20Room&meetingID=abc");
        assert_eq!(checksum, Some("deadbeef".to_string()));
        assert_eq!(hash, Some("sha256".to_string()));
    }

    #[test]
    fn empty_meetings_uses_canned_body() {
        assert_eq!(
            get_meetings_xml(&[]),
            b3lb_core::canned::GET_MEETINGS_NO_MEETINGS
        );
    }
}
