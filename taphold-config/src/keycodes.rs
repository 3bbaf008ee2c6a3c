use std::collections::HashMap;

use lazy_static::lazy_static;
use taphold_common::keycodes::key_range;

const DASH_USCORE: [char; 2] = ['_', '-'];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeycodeDesc {
    pub name: &'static str,
    pub code: u16,
}

lazy_static! {
    static ref KEY_DESCS: Vec<KeycodeDesc> = {
        let mut v = Vec::new();
        let mut ins = |names: &'static str, code: u16| {
            for name in names.split('/') {
                v.push(KeycodeDesc { name, code });
            }
        };

        for (i, names) in r#"
A B C D E F G H I J K L M N O P Q R S T U V W X Y Z
1 2 3 4 5 6 7 8 9 0
Enter/Return/ent
Escape/esc
Backspace/bksp
Tab
Space/spacebar/spc
Minus/-/dash
Equal/=/equals
LeftBrace/[/leftsquarebracket
RightBrace/]/rightsquarebracket
Backslash/\
NonUsHash
Semicolon/;
Apostrophe/'/leftapos
Grave/`/graveaccent
Comma/,
Dot/./period
Slash/forwardslash
CapsLock
F1 F2 F3 F4 F5 F6 F7 F8 F9 F10 F11 F12
PrintScreen/print
ScrollLock
Pause
Insert
Home PageUp/pgup Delete/del End PageDown/pgdn
Right Left Down Up
"#
        .split_whitespace()
        .enumerate()
        {
            ins(names, i as u16 + key_range::BASIC_MIN);
        }

        for (i, names) in r#"
LeftControl/lctrl/lctl
LeftShift/lshift
LeftAlt/lalt
LeftGui/leftmeta/lgui
RightControl/rctrl/rctl
RightShift/rshift
RightAlt/altgr/ralt
RightGui/rightmeta/rgui
"#
        .split_whitespace()
        .enumerate()
        {
            ins(names, i as u16 + key_range::MODIFIER_MIN);
        }
        // "/" cannot go through `ins`; it is the alias separator
        v.push(KeycodeDesc { name: "/", code: 0x38 });

        v
    };
    static ref KEY_NAMES: HashMap<String, u16> = {
        let mut m = HashMap::new();
        for d in KEY_DESCS.iter() {
            let k = normalize(d.name);
            if m.insert(k, d.code).is_some() {
                panic!("key already added {}", d.name);
            }
        }
        m
    };
    static ref CODE_NAMES: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        for d in KEY_DESCS.iter() {
            m.entry(d.code).or_insert(d.name);
        }
        m
    };
}

fn normalize(name: &str) -> String {
    if name.len() == 1 {
        name.to_lowercase()
    } else {
        name.replace(DASH_USCORE, "").to_lowercase()
    }
}

/// Look up a key code by name. Case, dashes and underscores are ignored; a leading `\` escapes
/// punctuation names.
pub fn key_code(name: &str) -> Option<u16> {
    let name = if name.len() > 1 && name.starts_with('\\') {
        &name[1..]
    } else {
        name
    };
    KEY_NAMES.get(normalize(name).as_str()).copied()
}

/// The primary name of `code`.
pub fn key_name(code: u16) -> Option<&'static str> {
    CODE_NAMES.get(&code).copied()
}

pub fn keycodes_iter() -> impl Iterator<Item = &'static KeycodeDesc> {
    KEY_DESCS.iter()
}

#[cfg(test)]
#[path = "keycodes_test.rs"]
mod test;
