/// Marker Sputnik uses for tests that are expected to fail
const NEGATIVE_MARKER: &str = "@negative";

/// Whether `source` is a negative conformance test
pub fn is_negative_test(source: &str) -> bool {
    source.contains(NEGATIVE_MARKER)
}

/// Fixup input so the parser is happy
///
/// Currently does two things:
/// * Remove the multiline escape created by `ReplHelper`
/// * Appends a `;` if the input does not already end a statement
pub fn fixup_input(input: &str) -> String {
    let mut ret = input.replace("\\\n", "\n");
    let trimmed = ret.trim_end();
    if !trimmed.is_empty() && !trimmed.ends_with(';') && !trimmed.ends_with('}') {
        ret += ";";
    }

    ret
}

/// Whether `input` still has open brackets, an open block comment or an open string
///
/// Closing brackets that do not match are left for the parser to complain about
pub fn is_incomplete(input: &str) -> bool {
    let mut brackets = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                let quote = c;
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        // Strings cannot span lines so the parser will report this
                        '\n' => {
                            closed = true;
                            break;
                        }
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        _ => (),
                    }
                }

                if !closed {
                    return true;
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                // Rest of the line is a comment
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut last = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if last == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    last = c;
                }

                if !closed {
                    return true;
                }
            }
            '(' | '[' | '{' => brackets.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if brackets.pop() != Some(open) {
                    return false;
                }
            }
            _ => (),
        }
    }

    !brackets.is_empty()
}

#[test]
fn test_fixup_input() {
    assert_eq!(fixup_input("x = 1 \\\ny = 2"), "x = 1 \ny = 2;");
    assert_eq!(fixup_input("asdf \\ \nme"), "asdf \\ \nme;");
    assert_eq!(fixup_input("meline"), "meline;");
    assert_eq!(fixup_input("meline;"), "meline;");
    assert_eq!(fixup_input("meline ;  "), "meline ;  ");
    assert_eq!(fixup_input("function f() {}"), "function f() {}");
    assert_eq!(fixup_input("  "), "  ");
}

#[test]
fn test_is_negative_test() {
    assert!(is_negative_test(include_str!(
        "../sputnik/12_Statement/12.14_The_try_Statement/S12.14_A16_T13.js"
    )));
    assert!(!is_negative_test(include_str!(
        "../sputnik/07_Lexical_Conventions/7.9_Automatic_Semicolon_Insertion/S7.9_A8_T4.js"
    )));
}

#[test]
fn test_is_incomplete() {
    let incomplete = vec![
        "function f() {",
        "log(1,",
        "var a = [1, [2]",
        "/* still going",
        "log('unterminated",
        "if (x) { log('}') ",
    ];
    for input in incomplete {
        assert!(is_incomplete(input), "{}", input);
    }

    let complete = vec![
        "log(1)",
        "function f() { return [1, 2]; }",
        "log('(')",
        "log(\"{\") // {",
        "/* ( */ x",
        "x)",
        "",
    ];
    for input in complete {
        assert!(!is_incomplete(input), "{}", input);
    }
}
