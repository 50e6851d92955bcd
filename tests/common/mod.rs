//! In-memory reservation site used by the integration tests.
//!
//! It mimics the quirks the form engine exists for: a month change clears the room, a
//! room change can knock the month back to its placeholder, and the day or time slots
//! can reset a moment after being set.

#![allow(dead_code)]

use async_trait::async_trait;
use reserve_runner::{
    DialogKind, DialogRecord, Error, FormPage, FormSelectors, Profile, Result, SelectOption,
    Timings, Toggle,
};
use std::cell::RefCell;

pub const LOGIN_URL: &str = "https://f-supportsys.com/kounan/reserve/login.php";
const BASE: &str = "https://f-supportsys.com/kounan/reserve/";
const FORM_BODY: &str = "利用希望月\n使用希望の部屋\n利用希望日\n希望時間\nこの条件で予約";

pub fn timings() -> Timings {
    Profile::Fast.timings()
}

pub fn opt(value: &str, label: &str) -> SelectOption {
    SelectOption::new(value, label)
}

#[derive(Debug, Clone)]
pub struct Facility {
    pub id: String,
    pub name: String,
}

pub fn facility(id: &str, name: &str) -> Facility {
    Facility {
        id: id.into(),
        name: name.into(),
    }
}

/// What the site does once submit is clicked.
#[derive(Debug, Clone)]
pub enum AfterSubmit {
    Navigate { url: String, body: String },
    /// Stays on the form, optionally replacing the page text.
    Stay { body: Option<String> },
}

/// Static layout and scripted behaviour of the fake site.
#[derive(Debug, Clone)]
pub struct Site {
    pub password: String,
    pub facilities: Vec<Facility>,
    /// Confirm dialogs raised when a facility form opens.
    pub facility_dialogs: Vec<String>,
    pub months: Vec<SelectOption>,
    pub rooms: Vec<SelectOption>,
    pub days: Vec<SelectOption>,
    pub slots: Vec<String>,
    /// Slots whose checkbox ignores clicks.
    pub stubborn_slots: Vec<String>,
    /// Room changes that reset the month to its placeholder.
    pub room_resets_month: u32,
    /// Times the day is cleared during a quiet period.
    pub day_drift: u32,
    /// Times all time slots are unchecked during a quiet period.
    pub slot_drift: u32,
    pub submit_present: bool,
    pub submit_dialogs: Vec<(DialogKind, String)>,
    pub after_submit: AfterSubmit,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            password: "secret".into(),
            facilities: vec![
                facility("5", "港南地区センター"),
                facility("6", "桜道コミュニティハウス"),
                facility("7", "桜道別館"),
            ],
            facility_dialogs: Vec::new(),
            months: vec![
                opt("0", "選択して下さい"),
                opt("2025-10:3", "2025年10月"),
                opt("2025-11:4", "2025年11月"),
            ],
            rooms: vec![
                opt("0", "選択して下さい"),
                opt("12", "多目的室"),
                opt("13", "和室"),
            ],
            days: vec![
                opt("0", "選択して下さい"),
                opt("1:1", "01"),
                opt("3:1", "03"),
            ],
            slots: vec!["午前".into(), "午後①".into(), "午後②".into()],
            stubborn_slots: Vec::new(),
            room_resets_month: 0,
            day_drift: 0,
            slot_drift: 0,
            submit_present: true,
            submit_dialogs: Vec::new(),
            after_submit: AfterSubmit::Navigate {
                url: format!("{}yoyaku_kakunin.php", BASE),
                body: "予約内容の確認\n利用料金合計 1,200円\n予約を確定する".into(),
            },
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Screen {
    #[default]
    Blank,
    Login,
    Menu,
    List,
    Form,
    Result,
}

/// Dialog recorder installed by the engine.
#[derive(Debug, Default)]
struct Hook {
    accept_limit: Option<usize>,
    log: Vec<DialogRecord>,
}

#[derive(Debug, Default)]
struct State {
    screen: Screen,
    url: String,
    body: String,
    facility: Option<String>,
    month: String,
    room: String,
    day: String,
    checked: Vec<bool>,
    hook: Option<Hook>,
    unhooked_dialogs: usize,
    dismissed_confirms: usize,
    title_fails: bool,
    room_resets_month: u32,
    day_drift: u32,
    slot_drift: u32,
    mutations: usize,
    filled: Vec<(String, String)>,
}

pub struct MockPage {
    sel: FormSelectors,
    site: Site,
    drift_pause_ms: u64,
    state: RefCell<State>,
}

impl MockPage {
    /// Starts on a blank page; the run has to log in.
    pub fn new(site: Site) -> Self {
        let state = State {
            url: "about:blank".into(),
            room_resets_month: site.room_resets_month,
            day_drift: site.day_drift,
            slot_drift: site.slot_drift,
            ..Default::default()
        };
        Self {
            sel: FormSelectors::default(),
            site,
            drift_pause_ms: timings().long_ms,
            state: RefCell::new(state),
        }
    }

    /// Starts on the form of facility 6.
    pub fn on_form(site: Site) -> Self {
        let page = Self::new(site);
        {
            let mut s = page.state.borrow_mut();
            page.open_form(&mut s, "6");
        }
        page
    }

    pub fn selectors(&self) -> &FormSelectors {
        &self.sel
    }

    /// Clicks, fills and selects performed so far.
    pub fn mutations(&self) -> usize {
        self.state.borrow().mutations
    }

    pub fn opened_facility(&self) -> Option<String> {
        self.state.borrow().facility.clone()
    }

    pub fn hook_installed(&self) -> bool {
        self.state.borrow().hook.is_some()
    }

    pub fn dismissed_confirms(&self) -> usize {
        self.state.borrow().dismissed_confirms
    }

    /// Make reads of the facility title fail from now on.
    pub fn break_title(&self) {
        self.state.borrow_mut().title_fails = true;
    }

    pub fn filled(&self) -> Vec<(String, String)> {
        self.state.borrow().filled.clone()
    }

    pub fn day_value(&self) -> String {
        self.state.borrow().day.clone()
    }

    fn facility_count(&self, selector: &str) -> usize {
        if selector == self.sel.facility_controls() {
            return self.site.facilities.len();
        }
        self.site
            .facilities
            .iter()
            .filter(|f| self.sel.facility_by_id(&f.id) == selector)
            .count()
    }

    fn exists(&self, s: &State, selector: &str) -> bool {
        let sel = &self.sel;
        match s.screen {
            Screen::Login => [
                &sel.login_facility_code,
                &sel.login_group_code,
                &sel.login_password,
                &sel.login_submit,
            ]
            .iter()
            .any(|x| x.as_str() == selector),
            Screen::Menu => selector == sel.reserve_menu,
            Screen::List => self.facility_count(selector) > 0,
            Screen::Form => {
                selector == sel.month
                    || selector == sel.room
                    || selector == sel.facility_title
                    || (selector == sel.day && !self.site.days.is_empty())
                    || (selector == sel.timeslots && !self.site.slots.is_empty())
                    || (selector == sel.submit && self.site.submit_present)
            }
            Screen::Blank | Screen::Result => false,
        }
    }

    /// Runs the facility's confirms first; a dismissed one keeps the list on screen.
    fn open_form(&self, s: &mut State, id: &str) {
        for message in &self.site.facility_dialogs {
            if !raise(s, DialogKind::Confirm, message) {
                return;
            }
        }
        s.facility = Some(id.to_string());
        s.screen = Screen::Form;
        s.url = format!("{}yoyaku_input.php", BASE);
        s.body = FORM_BODY.into();
        s.month = "0".into();
        s.room = "0".into();
        s.day = "0".into();
        s.checked = vec![false; self.site.slots.len()];
    }

    fn press_submit(&self, s: &mut State) {
        for (kind, message) in &self.site.submit_dialogs {
            raise(s, *kind, message);
        }
        match &self.site.after_submit {
            AfterSubmit::Navigate { url, body } => {
                s.screen = Screen::Result;
                s.url = url.clone();
                s.body = body.clone();
            }
            AfterSubmit::Stay { body: Some(body) } => s.body = body.clone(),
            AfterSubmit::Stay { body: None } => {}
        }
    }

    fn options_for(&self, s: &State, selector: &str) -> Vec<SelectOption> {
        if s.screen != Screen::Form {
            return Vec::new();
        }
        if selector == self.sel.month {
            self.site.months.clone()
        } else if selector == self.sel.room {
            self.site.rooms.clone()
        } else if selector == self.sel.day {
            self.site.days.clone()
        } else {
            Vec::new()
        }
    }
}

/// Raises a dialog and returns the page's answer.
fn raise(s: &mut State, kind: DialogKind, message: &str) -> bool {
    let Some(hook) = s.hook.as_mut() else {
        s.unhooked_dialogs += 1;
        return true;
    };
    let sequence = hook.log.len() + 1;
    hook.log.push(DialogRecord {
        sequence,
        kind,
        message: message.to_string(),
        timestamp_ms: 0,
    });
    let confirms = hook
        .log
        .iter()
        .filter(|d| d.kind == DialogKind::Confirm)
        .count();
    let accepted =
        kind != DialogKind::Confirm || hook.accept_limit.map_or(true, |n| confirms <= n);
    if !accepted {
        s.dismissed_confirms += 1;
    }
    accepted
}

fn timeout(what: &str) -> Error {
    Error::Timeout(format!("{} did not appear", what))
}

#[async_trait(?Send)]
impl FormPage for MockPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut s = self.state.borrow_mut();
        s.url = url.to_string();
        s.screen = if url == LOGIN_URL {
            Screen::Login
        } else {
            Screen::Blank
        };
        s.body = String::new();
        Ok(())
    }

    async fn url(&self) -> Result<String> {
        Ok(self.state.borrow().url.clone())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if !self.exists(&s, selector) {
            return Err(Error::ActionFailed(format!("'{}' not found", selector)));
        }
        s.mutations += 1;
        s.filled.push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if !self.exists(&s, selector) {
            return Err(Error::ActionFailed(format!("'{}' not found", selector)));
        }
        s.mutations += 1;
        let screen = s.screen;
        match screen {
            Screen::Login if selector == self.sel.login_submit => {
                let password_ok = s
                    .filled
                    .iter()
                    .rev()
                    .find(|(k, _)| *k == self.sel.login_password)
                    .is_some_and(|(_, v)| *v == self.site.password);
                if password_ok {
                    s.screen = Screen::Menu;
                    s.url = format!("{}menu.php", BASE);
                    s.body = "直接予約".into();
                }
            }
            Screen::Menu => {
                s.screen = Screen::List;
                s.url = format!("{}yoyaku_list.php", BASE);
                s.body = std::iter::once("地区センター・コミュニティハウス一覧".to_string())
                    .chain(self.site.facilities.iter().map(|f| f.name.clone()))
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            Screen::List => {
                let id = self
                    .site
                    .facilities
                    .iter()
                    .find(|f| self.sel.facility_by_id(&f.id) == selector)
                    .map(|f| f.id.clone());
                if let Some(id) = id {
                    self.open_form(&mut s, &id);
                }
            }
            Screen::Form if selector == self.sel.submit => self.press_submit(&mut s),
            _ => {}
        }
        Ok(())
    }

    async fn select_value(&self, selector: &str, value: &str) -> Result<()> {
        let mut s = self.state.borrow_mut();
        if !self
            .options_for(&s, selector)
            .iter()
            .any(|o| o.value == value)
        {
            return Err(Error::ActionFailed(format!(
                "option '{}' not found in '{}'",
                value, selector
            )));
        }
        s.mutations += 1;
        if selector == self.sel.month {
            s.month = value.to_string();
            s.room = "0".into();
            s.day = "0".into();
            s.checked.iter_mut().for_each(|c| *c = false);
        } else if selector == self.sel.room {
            s.room = value.to_string();
            if s.room_resets_month > 0 {
                s.room_resets_month -= 1;
                s.month = "0".into();
            }
        } else {
            s.day = value.to_string();
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout_ms: u64) -> Result<()> {
        let s = self.state.borrow();
        if self.exists(&s, selector) {
            Ok(())
        } else {
            Err(timeout(selector))
        }
    }

    async fn wait_for_text(&self, text: &str, _timeout_ms: u64) -> Result<()> {
        if self.state.borrow().body.contains(text) {
            Ok(())
        } else {
            Err(timeout(text))
        }
    }

    async fn wait_for_url(&self, fragment: &str, _timeout_ms: u64) -> Result<()> {
        if self.state.borrow().url.contains(fragment) {
            Ok(())
        } else {
            Err(timeout(fragment))
        }
    }

    async fn wait_for_idle(&self, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn pause(&self, ms: u64) {
        let mut s = self.state.borrow_mut();
        if ms < self.drift_pause_ms || s.screen != Screen::Form {
            return;
        }
        if s.day != "0" && s.day_drift > 0 {
            s.day_drift -= 1;
            s.day = "0".into();
        }
        if s.checked.iter().any(|c| *c) && s.slot_drift > 0 {
            s.slot_drift -= 1;
            s.checked.iter_mut().for_each(|c| *c = false);
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let s = self.state.borrow();
        Ok(match s.screen {
            Screen::List => self.facility_count(selector),
            _ => usize::from(self.exists(&s, selector)),
        })
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let s = self.state.borrow();
        if s.title_fails && selector == self.sel.facility_title {
            return Err(Error::ActionFailed(format!("'{}' detached", selector)));
        }
        if s.screen != Screen::Form || selector != self.sel.facility_title {
            return Ok(None);
        }
        Ok(s.facility.as_ref().and_then(|id| {
            self.site
                .facilities
                .iter()
                .find(|f| &f.id == id)
                .map(|f| f.name.clone())
        }))
    }

    async fn attributes(&self, selector: &str, name: &str) -> Result<Vec<String>> {
        let s = self.state.borrow();
        if s.screen != Screen::List
            || selector != self.sel.facility_controls()
            || name != self.sel.facility_id_attr
        {
            return Ok(Vec::new());
        }
        Ok(self
            .site
            .facilities
            .iter()
            .map(|f| format!("{}({}, 1);", self.sel.facility_id_call, f.id))
            .collect())
    }

    async fn body_text(&self) -> Result<String> {
        Ok(self.state.borrow().body.clone())
    }

    async fn options(&self, selector: &str) -> Result<Vec<SelectOption>> {
        Ok(self.options_for(&self.state.borrow(), selector))
    }

    async fn selected(&self, selector: &str) -> Result<Option<SelectOption>> {
        let s = self.state.borrow();
        let current = if selector == self.sel.month {
            &s.month
        } else if selector == self.sel.room {
            &s.room
        } else if selector == self.sel.day {
            &s.day
        } else {
            return Ok(None);
        };
        Ok(self
            .options_for(&s, selector)
            .into_iter()
            .find(|o| &o.value == current))
    }

    async fn toggles(&self, selector: &str) -> Result<Vec<Toggle>> {
        let s = self.state.borrow();
        if s.screen != Screen::Form || selector != self.sel.timeslots {
            return Ok(Vec::new());
        }
        Ok(self
            .site
            .slots
            .iter()
            .zip(&s.checked)
            .map(|(label, checked)| Toggle {
                label: label.clone(),
                checked: Some(*checked),
            })
            .collect())
    }

    async fn click_nth(&self, selector: &str, index: usize) -> Result<()> {
        let mut s = self.state.borrow_mut();
        let screen = s.screen;
        match screen {
            Screen::Form if selector == self.sel.timeslots => {
                let Some(label) = self.site.slots.get(index) else {
                    return Err(Error::ActionFailed(format!("no time slot #{}", index)));
                };
                s.mutations += 1;
                if !self.site.stubborn_slots.contains(label) {
                    s.checked[index] = !s.checked[index];
                }
                Ok(())
            }
            Screen::List => {
                let id = self
                    .site
                    .facilities
                    .iter()
                    .filter(|f| self.sel.facility_by_id(&f.id) == selector)
                    .nth(index)
                    .map(|f| f.id.clone())
                    .ok_or_else(|| Error::ActionFailed(format!("no '{}' #{}", selector, index)))?;
                s.mutations += 1;
                self.open_form(&mut s, &id);
                Ok(())
            }
            _ => Err(Error::ActionFailed(format!("no '{}' #{}", selector, index))),
        }
    }

    async fn row_controls(
        &self,
        _row: &str,
        _cell: &str,
        text: &str,
        _control: &str,
    ) -> Result<Vec<String>> {
        let s = self.state.borrow();
        if s.screen != Screen::List {
            return Ok(Vec::new());
        }
        Ok(self
            .site
            .facilities
            .iter()
            .filter(|f| f.name.contains(text))
            .map(|f| self.sel.facility_by_id(&f.id))
            .collect())
    }

    async fn install_dialog_hook(&self, accept_limit: Option<usize>) -> Result<()> {
        self.state.borrow_mut().hook = Some(Hook {
            accept_limit,
            log: Vec::new(),
        });
        Ok(())
    }

    async fn remove_dialog_hook(&self) -> Result<Vec<DialogRecord>> {
        Ok(self
            .state
            .borrow_mut()
            .hook
            .take()
            .map(|h| h.log)
            .unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
