//! Login-surface heuristics.
//!
//! A deterministic classifier over the probe's final URL, header blob and
//! body snippet. Rules are evaluated in the catalogue order below and the
//! first match wins; the ordering is part of the contract and pinned by the
//! tests at the bottom of this file:
//!
//! 1. OWA
//! 2. Rocket.Chat
//! 3. ERPNext / Frappe
//! 4. Nextcloud
//! 5. Proxmox (PMG, PBS, PVE)
//! 6. Zabbix
//! 7. OPNsense
//! 8. CipherMail
//! 9. Generic password form / login page
//!
//! All comparisons are case-insensitive substring checks.

/// Classifier outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSignal {
    pub detected: bool,
    pub login_type: Option<String>,
}

impl LoginSignal {
    fn none() -> Self {
        Self {
            detected: false,
            login_type: None,
        }
    }

    fn of(login_type: &str) -> Self {
        Self {
            detected: true,
            login_type: Some(login_type.to_string()),
        }
    }
}

/// Lowercased views of the probe output, prepared once per classification.
struct Haystack {
    url: String,
    headers: String,
    body: String,
    title: String,
}

impl Haystack {
    fn new(final_url: &str, header_blob: &str, body_snippet: &str) -> Self {
        let body = body_snippet.to_lowercase();
        Self {
            url: final_url.to_lowercase(),
            headers: header_blob.to_lowercase(),
            title: extract_title(&body),
            body,
        }
    }

    /// Title or body contains the (already lowercase) needle.
    fn text_contains(&self, needle: &str) -> bool {
        self.title.contains(needle) || self.body.contains(needle)
    }

    fn text_contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text_contains(n))
    }

    fn url_contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.url.contains(n))
    }

    fn has_password_input(&self) -> bool {
        self.body.contains("type=\"password\"") || self.body.contains("type='password'")
    }
}

fn extract_title(lower_body: &str) -> String {
    let Some(start) = lower_body.find("<title") else {
        return String::new();
    };
    let Some(open_end) = lower_body[start..].find('>') else {
        return String::new();
    };
    let after = &lower_body[start + open_end + 1..];
    match after.find("</title>") {
        Some(end) => after[..end].trim().to_string(),
        None => String::new(),
    }
}

type Rule = fn(&Haystack) -> Option<LoginSignal>;

/// The catalogue, in contract order.
const CATALOGUE: &[(&str, Rule)] = &[
    ("OWA", owa),
    ("RocketChat", rocket_chat),
    ("ERPNext", erpnext),
    ("Nextcloud", nextcloud),
    ("Proxmox", proxmox),
    ("Zabbix", zabbix),
    ("OPNsense", opnsense),
    ("CipherMail", ciphermail),
    ("Generic", generic),
];

/// Classify a probe's final URL, header blob and body snippet.
pub fn classify(final_url: &str, header_blob: &str, body_snippet: &str) -> LoginSignal {
    classify_with_hint(None, final_url, header_blob, body_snippet)
}

/// Classify with an optional per-target rule hint. A hint naming a catalogue
/// entry moves that rule to the front; unknown hints are ignored.
pub fn classify_with_hint(
    hint: Option<&str>,
    final_url: &str,
    header_blob: &str,
    body_snippet: &str,
) -> LoginSignal {
    let haystack = Haystack::new(final_url, header_blob, body_snippet);

    if let Some(hint) = hint {
        if let Some((_, rule)) = CATALOGUE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(hint))
        {
            if let Some(signal) = rule(&haystack) {
                return signal;
            }
        }
    }

    for (_, rule) in CATALOGUE {
        if let Some(signal) = rule(&haystack) {
            return signal;
        }
    }

    LoginSignal::none()
}

fn owa(h: &Haystack) -> Option<LoginSignal> {
    if h.url_contains_any(&["/owa/", "errorfe.aspx"]) || h.text_contains_any(&["outlook", "owa/auth"])
    {
        return Some(LoginSignal::of("OWA"));
    }
    None
}

fn rocket_chat(h: &Haystack) -> Option<LoginSignal> {
    // Unambiguous product markers stand on their own; the weaker meteor
    // fingerprints need a login-ish URL to back them up.
    let strong = h.text_contains_any(&["rocket.chat", "__meteor_runtime_config__"]);
    let weak = h.text_contains_any(&["meteor", "rc-root", "rocketchat"]);
    let url_hint = h.url_contains_any(&["/home", "/login"]);

    if strong || (weak && url_hint) {
        return Some(LoginSignal::of("RocketChat"));
    }
    None
}

fn erpnext(h: &Haystack) -> Option<LoginSignal> {
    // "frappe" also covers frappe.boot, frappe.csrf_token and
    // /api/method/frappe. markers.
    let content = h.text_contains_any(&["erpnext", "frappe"]);
    let url_hint = h.url_contains_any(&["/login", "/desk"]);
    let header_hint = h.headers.contains("x-frappe-") || h.headers.contains("sid=");

    if content && (url_hint || header_hint) {
        return Some(LoginSignal::of("ERPNext"));
    }
    None
}

fn nextcloud(h: &Haystack) -> Option<LoginSignal> {
    if h.text_contains("nextcloud") || h.body.contains("body-login") || h.body.contains("nc-login")
    {
        return Some(LoginSignal::of("Nextcloud"));
    }
    None
}

fn proxmox(h: &Haystack) -> Option<LoginSignal> {
    let pmg = h.url.contains("/pmg") && h.text_contains("proxmox mail gateway");
    if pmg {
        return Some(LoginSignal::of("ProxmoxPMG"));
    }

    let pbs = h.url_contains_any(&["/pbs", ":8007"]) && h.text_contains("proxmox backup server");
    if pbs {
        return Some(LoginSignal::of("ProxmoxPBS"));
    }

    let pve = h.url_contains_any(&["/pve2/", ":8006"])
        && h.text_contains_any(&["proxmox virtual environment", "proxmox ve"]);
    if pve {
        return Some(LoginSignal::of("ProxmoxPVE"));
    }
    None
}

fn zabbix(h: &Haystack) -> Option<LoginSignal> {
    if h.text_contains("zabbix") && h.has_password_input() {
        return Some(LoginSignal::of("Zabbix"));
    }
    None
}

fn opnsense(h: &Haystack) -> Option<LoginSignal> {
    if h.text_contains("opnsense") && h.has_password_input() {
        return Some(LoginSignal::of("OPNsense"));
    }
    None
}

fn ciphermail(h: &Haystack) -> Option<LoginSignal> {
    if h.text_contains_any(&["ciphermail", "djigzo"]) && h.has_password_input() {
        return Some(LoginSignal::of("CipherMail"));
    }
    None
}

fn generic(h: &Haystack) -> Option<LoginSignal> {
    if h.has_password_input() {
        return Some(LoginSignal::of("PasswordForm"));
    }
    if h.body.contains("login")
        && (h.body.contains("<form")
            || h.body.contains("username")
            || h.body.contains("email")
            || h.body.contains("sign in"))
    {
        return Some(LoginSignal::of("LoginPage"));
    }
    None
}
