//! [`FormPage`] over a live eoka (CDP) page.
//!
//! Dialog capture has two layers. `window.alert/confirm/prompt` are swapped for
//! recorders in the current document and, through `Page.addScriptToEvaluateOnNewDocument`,
//! in every document loaded while the capture is open; the log lives in `sessionStorage`
//! so it follows same-origin navigations. Whatever still reaches the browser as a native
//! dialog arrives as `Page.javascriptDialogOpening` and is answered from the CDP event
//! stream while any page call is in flight.

use super::{DialogKind, DialogRecord, FormPage, SelectOption, Toggle};
use crate::{Error, Result};
use async_trait::async_trait;
use eoka::cdp::transport::CdpMessage;
use eoka::Page;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::cell::RefCell;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// `sessionStorage` key holding the dialog log.
const DIALOG_LOG_KEY: &str = "__reserve_runner_dialogs";

const DIALOG_OPENING_EVENT: &str = "Page.javascriptDialogOpening";

/// How often pending CDP events are drained while a capture is open.
const DIALOG_POLL: Duration = Duration::from_millis(50);

/// Shared helper: a CSS path that selects exactly this element.
const CSS_PATH_JS: &str = r#"
    const cssPath = (el) => {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let node = el;
        while (node && node !== document.body) {
            if (node.id) {
                path.unshift('#' + CSS.escape(node.id));
                return path.join(' > ');
            }
            let selector = node.tagName.toLowerCase();
            const siblings = Array.from(node.parentNode?.children || []);
            if (siblings.length > 1) selector += ':nth-child(' + (siblings.indexOf(node) + 1) + ')';
            path.unshift(selector);
            node = node.parentNode;
        }
        path.unshift('body');
        return path.join(' > ');
    };
"#;

const SELECT_VALUE_JS: &str = r#"(arg) => {
    const sel = document.querySelector(arg.sel);
    if (!sel) return 'element_not_found';
    const opt = Array.from(sel.options).find(o => o.value === arg.val);
    if (!opt) return 'option_not_found';
    sel.value = opt.value;
    sel.dispatchEvent(new Event('input', { bubbles: true }));
    sel.dispatchEvent(new Event('change', { bubbles: true }));
    return 'ok';
}"#;

const OPTIONS_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el || !el.options) return '[]';
    return JSON.stringify(Array.from(el.options).map(o => ({
        value: o.value ?? '',
        label: (o.textContent || '').trim(),
    })));
}"#;

const SELECTED_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    if (!el || !el.options || el.selectedIndex < 0) return 'null';
    const o = el.options[el.selectedIndex];
    return JSON.stringify({ value: o.value ?? '', label: (o.textContent || '').trim() });
}"#;

const TOGGLES_JS: &str = r#"(sel) => JSON.stringify(
    Array.from(document.querySelectorAll(sel)).map(l => {
        const input = l.querySelector('input');
        return {
            label: (l.innerText || l.textContent || '').trim(),
            checked: input ? !!input.checked : null,
        };
    })
)"#;

const CLICK_NTH_JS: &str = r#"(arg) => {
    const el = document.querySelectorAll(arg.sel)[arg.index];
    if (!el) return false;
    el.click();
    return true;
}"#;

const TEXT_JS: &str = r#"(sel) => {
    const el = document.querySelector(sel);
    return el ? (el.innerText || el.textContent || '').trim() : null;
}"#;

const ATTRIBUTES_JS: &str = r#"(arg) => JSON.stringify(
    Array.from(document.querySelectorAll(arg.sel))
        .map(el => el.getAttribute(arg.name))
        .filter(v => v !== null)
)"#;

// Only the innermost matching cell counts, so a layout table wrapping the whole list
// never claims the first facility's control.
const ROW_CONTROLS_JS: &str = r#"(arg) => {
    __CSS_PATH__
    const rows = new Set();
    const out = [];
    for (const cell of document.querySelectorAll(arg.cell)) {
        if (!(cell.textContent || '').includes(arg.text)) continue;
        const nested = Array.from(cell.querySelectorAll(arg.cell))
            .some(c => (c.textContent || '').includes(arg.text));
        if (nested) continue;
        const row = cell.closest(arg.row);
        if (!row || rows.has(row)) continue;
        rows.add(row);
        const control = row.querySelector(arg.control);
        if (control) out.push(cssPath(control));
    }
    return JSON.stringify(out);
}"#;

// Opaque origins (data: URLs) have no sessionStorage; the log then lives on `window`.
const INSTALL_DIALOG_HOOK_JS: &str = r#"(arg) => {
    const load = () => {
        try { return JSON.parse(sessionStorage.getItem(arg.key) || '[]'); }
        catch (e) { return window.__reserveRunnerLog || []; }
    };
    const save = (log) => {
        window.__reserveRunnerLog = log;
        try { sessionStorage.setItem(arg.key, JSON.stringify(log)); } catch (e) {}
    };
    if (arg.reset) save([]);
    if (!window.__reserveRunnerNative) {
        window.__reserveRunnerNative = {
            alert: window.alert,
            confirm: window.confirm,
            prompt: window.prompt,
        };
    }
    const record = (kind, message) => {
        const log = load();
        log.push({ kind, message: String(message ?? ''), at: Date.now() });
        save(log);
        return log.filter(d => d.kind === 'confirm').length;
    };
    window.alert = (m) => { record('alert', m); };
    window.confirm = (m) => {
        const n = record('confirm', m);
        return arg.limit === null || n <= arg.limit;
    };
    window.prompt = (m, d) => { record('prompt', m); return d ?? ''; };
    return true;
}"#;

const REMOVE_DIALOG_HOOK_JS: &str = r#"(key) => {
    let log = window.__reserveRunnerLog || [];
    try {
        const stored = sessionStorage.getItem(key);
        if (stored) log = JSON.parse(stored);
        sessionStorage.removeItem(key);
    } catch (e) {}
    delete window.__reserveRunnerLog;
    const native = window.__reserveRunnerNative;
    if (native) {
        window.alert = native.alert;
        window.confirm = native.confirm;
        window.prompt = native.prompt;
        delete window.__reserveRunnerNative;
    }
    return JSON.stringify(log);
}"#;

#[derive(Deserialize)]
struct RawDialog {
    kind: DialogKind,
    message: String,
    at: f64,
}

/// Params of `Page.javascriptDialogOpening`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DialogOpening {
    #[serde(rename = "type")]
    kind: DialogKind,
    #[serde(default)]
    message: String,
    #[serde(default)]
    default_prompt: Option<String>,
}

/// Orders both capture layers by the time each dialog was raised.
fn number_dialogs(mut raw: Vec<RawDialog>) -> Vec<DialogRecord> {
    raw.sort_by(|a, b| a.at.total_cmp(&b.at));
    raw.into_iter()
        .enumerate()
        .map(|(i, d)| DialogRecord {
            sequence: i + 1,
            kind: d.kind,
            message: d.message,
            timestamp_ms: d.at.max(0.0) as u64,
        })
        .collect()
}

/// An open capture window.
struct Capture {
    accept_limit: Option<usize>,
    /// Identifier of the recorder registered for new documents.
    script_id: String,
    /// Dialogs answered over CDP.
    native: Vec<RawDialog>,
}

impl Capture {
    /// Log a native dialog; returns whether to accept it.
    fn record(&mut self, opening: &DialogOpening) -> bool {
        self.native.push(RawDialog {
            kind: opening.kind,
            message: opening.message.clone(),
            at: chrono::Utc::now().timestamp_millis() as f64,
        });
        let confirms = self
            .native
            .iter()
            .filter(|d| d.kind == DialogKind::Confirm)
            .count();
        opening.kind != DialogKind::Confirm
            || self.accept_limit.map_or(true, |n| confirms <= n)
    }
}

/// A live browser page.
pub struct EokaPage {
    page: Page,
    capture: RefCell<Option<Capture>>,
}

impl EokaPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            capture: RefCell::new(None),
        }
    }

    fn capturing(&self) -> bool {
        self.capture.borrow().is_some()
    }

    /// Run a page call; while a capture is open, answer native dialogs until it returns.
    /// An open native dialog blocks every `Runtime.evaluate`.
    async fn guarded<T>(&self, action: impl Future<Output = Result<T>>) -> Result<T> {
        if !self.capturing() {
            return action.await;
        }
        tokio::select! {
            result = action => result,
            Err(e) = self.pump_dialogs() => Err(e),
        }
    }

    async fn pump_dialogs(&self) -> Result<()> {
        loop {
            self.answer_dialogs().await?;
            tokio::time::sleep(DIALOG_POLL).await;
        }
    }

    /// Drain pending CDP events and answer every dialog opened on this page.
    async fn answer_dialogs(&self) -> Result<()> {
        let session = self.page.session();
        while let Some(message) = session.transport().try_recv_event().await {
            let CdpMessage::Event {
                method,
                params,
                session_id,
            } = message
            else {
                continue;
            };
            let ours = session_id.as_deref() == Some(session.session_id());
            if method != DIALOG_OPENING_EVENT || !ours {
                continue;
            }
            let opening: DialogOpening = serde_json::from_value(params)?;
            let accept = match self.capture.borrow_mut().as_mut() {
                Some(capture) => capture.record(&opening),
                None => true,
            };
            debug!(
                "native {} dialog '{}' {}",
                opening.kind,
                opening.message,
                if accept { "accepted" } else { "dismissed" }
            );
            if accept {
                self.page
                    .accept_dialog(opening.default_prompt.as_deref())
                    .await?;
            } else {
                self.page.dismiss_dialog().await?;
            }
        }
        Ok(())
    }

    async fn forget_script(&self, script_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .page
            .session()
            .send(
                "Page.removeScriptToEvaluateOnNewDocument",
                &json!({ "identifier": script_id }),
            )
            .await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(&self, func: &str, arg: serde_json::Value) -> Result<T> {
        let js = format!("({})({})", func, arg);
        self.guarded(async { Ok(self.page.evaluate(&js).await?) })
            .await
    }

    /// Call a function that returns its result as a JSON string.
    async fn call_json<T: DeserializeOwned>(
        &self,
        func: &str,
        arg: serde_json::Value,
    ) -> Result<T> {
        let raw: String = self.call(func, arg).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait(?Send)]
impl FormPage for EokaPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        self.guarded(async { Ok(self.page.url().await?) }).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.page.fill(selector, value).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.guarded(async { Ok(self.page.click(selector).await?) })
            .await
    }

    async fn select_value(&self, selector: &str, value: &str) -> Result<()> {
        let result: String = self
            .call(SELECT_VALUE_JS, json!({ "sel": selector, "val": value }))
            .await?;
        match result.as_str() {
            "ok" => Ok(()),
            "element_not_found" => Err(Error::ActionFailed(format!(
                "select '{}' not found",
                selector
            ))),
            "option_not_found" => Err(Error::ActionFailed(format!(
                "option '{}' not found in '{}'",
                value, selector
            ))),
            other => Err(Error::ActionFailed(format!("select failed: {}", other))),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        self.guarded(async {
            self.page
                .wait_for(selector, timeout_ms)
                .await
                .map(|_| ())
                .map_err(|e| {
                    Error::Timeout(format!(
                        "'{}' did not appear within {}ms ({})",
                        selector, timeout_ms, e
                    ))
                })
        })
        .await
    }

    async fn wait_for_text(&self, text: &str, timeout_ms: u64) -> Result<()> {
        self.page
            .wait_for_text(text, timeout_ms)
            .await
            .map(|_| ())
            .map_err(|e| {
                Error::Timeout(format!(
                    "text '{}' did not appear within {}ms ({})",
                    text, timeout_ms, e
                ))
            })
    }

    async fn wait_for_url(&self, fragment: &str, timeout_ms: u64) -> Result<()> {
        self.guarded(async {
            self.page
                .wait_for_url_contains(fragment, timeout_ms)
                .await
                .map(|_| ())
                .map_err(|e| {
                    Error::Timeout(format!(
                        "url did not contain '{}' within {}ms ({})",
                        fragment, timeout_ms, e
                    ))
                })
        })
        .await
    }

    async fn wait_for_idle(&self, timeout_ms: u64) -> Result<()> {
        self.guarded(async {
            self.page.wait_for_network_idle(500, timeout_ms).await?;
            Ok(())
        })
        .await
    }

    async fn pause(&self, ms: u64) {
        let waited = self
            .guarded(async {
                self.page.wait(ms).await;
                Ok(())
            })
            .await;
        if let Err(e) = waited {
            warn!("answering a dialog failed: {}", e);
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.call("(sel) => document.querySelectorAll(sel).length", json!(selector))
            .await
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        self.call(TEXT_JS, json!(selector)).await
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<String>> {
        self.call_json(ATTRIBUTES_JS, json!({ "sel": selector, "name": name }))
            .await
    }

    async fn body_text(&self) -> Result<String> {
        self.guarded(async { Ok(self.page.text().await?) }).await
    }

    async fn options(&self, selector: &str) -> Result<Vec<SelectOption>> {
        self.call_json(OPTIONS_JS, json!(selector)).await
    }

    async fn selected(&self, selector: &str) -> Result<Option<SelectOption>> {
        self.call_json(SELECTED_JS, json!(selector)).await
    }

    async fn toggles(&self, selector: &str) -> Result<Vec<Toggle>> {
        self.call_json(TOGGLES_JS, json!(selector)).await
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let clicked: bool = self
            .call(CLICK_NTH_JS, json!({ "sel": selector, "index": index }))
            .await?;
        if clicked {
            Ok(())
        } else {
            Err(Error::ActionFailed(format!(
                "no element #{} for '{}'",
                index, selector
            )))
        }
    }

    async fn row_controls(
        &self,
        row: &str,
        cell: &str,
        text: &str,
        control: &str,
    ) -> Result<Vec<String>> {
        let func = ROW_CONTROLS_JS.replace("__CSS_PATH__", CSS_PATH_JS);
        self.call_json(
            &func,
            json!({ "row": row, "cell": cell, "text": text, "control": control }),
        )
        .await
    }

    async fn install_dialog_hook(&self, accept_limit: Option<usize>) -> Result<()> {
        let arg = |reset: bool| {
            json!({ "key": DIALOG_LOG_KEY, "limit": accept_limit, "reset": reset })
        };
        let source = format!("({})({})", INSTALL_DIALOG_HOOK_JS, arg(false));
        let script_id = self
            .page
            .session()
            .add_script_to_evaluate_on_new_document(&source)
            .await?;
        *self.capture.borrow_mut() = Some(Capture {
            accept_limit,
            script_id,
            native: Vec::new(),
        });

        let installed: Result<bool> = self.call(INSTALL_DIALOG_HOOK_JS, arg(true)).await;
        if let Err(e) = installed {
            if let Err(undo) = self.remove_dialog_hook().await {
                debug!("undoing dialog hook: {}", undo);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn remove_dialog_hook(&self) -> Result<Vec<DialogRecord>> {
        let logged: Result<Vec<RawDialog>> = self
            .call_json(REMOVE_DIALOG_HOOK_JS, json!(DIALOG_LOG_KEY))
            .await;
        let drained = self.answer_dialogs().await;
        let capture = self.capture.borrow_mut().take();
        let released = match &capture {
            Some(c) => self.forget_script(&c.script_id).await,
            None => Ok(()),
        };

        let mut raw = logged?;
        drained?;
        released?;
        if let Some(capture) = capture {
            raw.extend(capture.native);
        }
        Ok(number_dialogs(raw))
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }
}
