use std::path::Path;

use crate::keycodes::key_code;

use super::*;

fn kc(name: &str) -> u16 {
    match key_code(name) {
        Some(kc) => kc,
        None => panic!("Unknown key mnemonic: {name:?}"),
    }
}

fn pretty_compile(src: &str) -> Result<TapHoldConfig> {
    crate::pretty_compile(Path::new("test"), src)
}

macro_rules! compile_global {
    ($result:ident, $name:expr, $value:expr, $x:tt) => {{
        let src = format!("[global]\n{} = {}\n", $name, $value);
        let $result = compile(src.as_str());

        $x
    }};
}

fn error_text(src: &str) -> (String, &str) {
    let err = compile(src).unwrap_err();
    let span = err.span.clone().unwrap();
    (err.message, &src[span])
}

#[test]
fn globals() {
    compile_global!(result, "tapping_term", 150, {
        let config = result.unwrap();
        assert_eq!(config.tapping_term, Some(150));
        assert_eq!(config.permissive_hold, None);
        assert_eq!(config.serialize_globals(), [globals::TAPPING_TERM, 150]);
    });

    compile_global!(result, "permissive_hold", "true", {
        let config = result.unwrap();
        assert_eq!(config.permissive_hold, Some(true));
        assert_eq!(config.serialize_globals(), [globals::PERMISSIVE_HOLD, 1]);
    });

    compile_global!(result, "tapping_term", 5001, {
        let err = result.unwrap_err();
        assert_eq!(
            err.message,
            "Invalid duration; only 0 to 5000 milliseconds are valid"
        );
        assert_eq!(err.span, Some(24..28));
    });

    compile_global!(result, "permissive_hold", "yes", {
        assert_eq!(result.unwrap_err().message, "Expected true or false");
    });

    compile_global!(result, "tap_term", 100, {
        let err = result.unwrap_err();
        assert_eq!(err.message, "Invalid global 'tap_term'");
        assert_eq!(err.span, Some(9..17));
    });

    compile_global!(result, "tapping_term", "100 200", {
        assert_eq!(result.unwrap_err().message, TOO_MANY_RHS);
    });
}

#[test]
fn tap_hold_section() {
    let config = pretty_compile(
        r#"
# home row shifts
[tap_hold]
1 = space rightshift permissive_hold tapping_term=150 # thumb
0 = enter   leftshift
2 = 0x2a left_control permissive_hold=false
"#,
    )
    .unwrap();

    assert_eq!(config.binding_count(), 3);
    let indexes: Vec<_> = config.bindings().map(|b| b.index).collect();
    assert_eq!(indexes, [0, 1, 2]);

    let b = config.binding(0).unwrap();
    assert_eq!((b.tap, b.hold), (kc("enter"), kc("leftshift")));
    assert_eq!((b.permissive_hold, b.tapping_term), (None, None));

    let b = config.binding(1).unwrap();
    assert_eq!((b.tap, b.hold), (kc("space"), kc("rightshift")));
    assert_eq!((b.permissive_hold, b.tapping_term), (Some(true), Some(150)));

    let b = config.binding(2).unwrap();
    assert_eq!((b.tap, b.hold), (kc("backspace"), kc("leftcontrol")));
    assert_eq!(b.permissive_hold, Some(false));
}

#[test]
fn serialize() {
    let config = compile(
        r#"
[global]
tapping_term = 180

[tap_hold]
1 = space rightshift permissive_hold
0 = enter leftshift tapping_term=120
"#,
    )
    .unwrap();

    assert_eq!(
        config.serialize(),
        [
            PROTOCOL_VERSION,
            2,
            2,
            globals::TAPPING_TERM,
            180,
            0,
            kc("enter"),
            kc("leftshift"),
            USE_GLOBAL,
            120,
            1,
            kc("space"),
            kc("rightshift"),
            1,
            USE_GLOBAL,
        ]
    );
}

#[test]
fn empty_config() {
    let config = compile("# nothing here\n\n").unwrap();
    assert_eq!(config.binding_count(), 0);
    assert_eq!(config.serialize(), [PROTOCOL_VERSION, 0, 0]);
}

#[test]
fn binding_errors() {
    assert_eq!(
        error_text("[tap_hold]\n0 = enter lefshift\n"),
        ("Unknown keycode 'lefshift'".into(), "lefshift")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = enter\n"),
        (MISSING_ACTIONS.into(), "enter")
    );
    assert_eq!(
        error_text("[tap_hold]\nx = enter leftshift\n"),
        ("Invalid binding index".into(), "x")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = a b\n0 = c d\n"),
        ("Duplicate binding index 0".into(), "0")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = a b hold_first\n"),
        ("Invalid option 'hold_first'".into(), "hold_first")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = a b tapping_term\n"),
        ("Invalid option 'tapping_term'".into(), "tapping_term")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = a b tapping_term=fast\n"),
        (
            "Invalid duration; only 0 to 5000 milliseconds are valid".into(),
            "fast"
        )
    );
    assert_eq!(
        error_text("[tap_hold]\n0 = a b\n2 = c d\n"),
        (
            "Binding index 1 is missing; indexes must count up from 0".into(),
            "2 = c d"
        )
    );
}

#[test]
fn syntax_errors() {
    assert_eq!(
        error_text("0 = enter leftshift\n"),
        ("expected '['".into(), "0")
    );
    assert_eq!(
        error_text("[tap_hold\n"),
        ("missing ']'".into(), "[")
    );
    assert_eq!(
        error_text("[layers]\n"),
        ("Unknown section 'layers'".into(), "[layers]")
    );
    assert_eq!(
        error_text("[tap_hold]\n0 enter leftshift\n"),
        ("Missing =".into(), "0 enter leftshift")
    );
    assert_eq!(
        error_text("[global]\ntapping_term =   # none\n"),
        ("Missing RHS".into(), "tapping_term =")
    );
}
