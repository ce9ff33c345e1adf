use std::io;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Error;
use ren_interpreter::universe::Universe;
use ren_lexer::{Lexer, Token};

/// How many more closing brackets the input needs, negative if it has too many.
fn open_brackets(source: &str) -> isize {
    Lexer::new(source).skip_comments(true).skip_whitespace(true).fold(0, |depth, token| match token {
        Token::NewBlock | Token::NewGroup => depth + 1,
        Token::EndBlock | Token::EndGroup => depth - 1,
        _ => depth,
    })
}

/// Launches an interactive Read-Eval-Print-Loop within the given universe.
pub fn interactive(universe: &mut Universe, verbose: bool) -> Result<(), Error> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    let mut counter = 0;
    let mut source = String::new();
    let mut line = String::new();

    loop {
        if source.is_empty() {
            write!(&mut stdout, "({}) >> ", counter)?;
        } else {
            write!(&mut stdout, "({}) .. ", counter)?;
        }
        stdout.flush()?;
        line.clear();
        stdin.read_line(&mut line)?;
        if line.is_empty() {
            writeln!(&mut stdout, "exit")?;
            break;
        }
        if source.is_empty() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "exit" || trimmed == "quit" {
                break;
            }
        }
        source.push_str(&line);
        if open_brackets(&source) > 0 {
            continue;
        }

        let start = Instant::now();
        let result = universe.run(&source);
        let elapsed = start.elapsed();
        source.clear();

        match result {
            Ok(value) if value.is_void() => {}
            Ok(value) if value.is_null() => writeln!(&mut stdout, "; null")?,
            Ok(value) => writeln!(&mut stdout, "== {}", universe.mold(&value))?,
            Err(err) if err.is_halt() => writeln!(&mut stdout, "[escape]")?,
            Err(err) => writeln!(&mut stdout, "{}", err)?,
        }
        if verbose {
            writeln!(&mut stdout, "Execution time: {} ms ({} µs)", elapsed.as_millis(), elapsed.as_micros())?;
            writeln!(&mut stdout)?;
        }

        counter += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_unclosed_brackets() {
        assert_eq!(open_brackets("print 1"), 0);
        assert_eq!(open_brackets("f: func [x] ["), 1);
        assert_eq!(open_brackets("either (a [b] ["), 2);
        assert_eq!(open_brackets("]"), -1);
        assert_eq!(open_brackets("{[} \"(\" ; ["), 0);
    }
}
