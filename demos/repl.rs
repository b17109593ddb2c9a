use minilisp::ast::{Callable, Expression};
use minilisp::foreign::{ForeignValue, PackageRegistry};
use minilisp::interpreter::Interpreter;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;

fn main() {
    let result = panic::catch_unwind(|| {
        // A program passed on the command line is evaluated once instead of starting the REPL
        match std::env::args().nth(1) {
            Some(program) => run_once(&program),
            None => run_repl(),
        }
    });

    if let Err(panic_info) = result {
        eprintln!("The interpreter encountered a fatal error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Foreign packages available to the demo as `math.*` and `strings.*`
fn demo_registry() -> PackageRegistry {
    let mut registry = PackageRegistry::new();

    registry.register("math", "sqrt", |args| match args.as_slice() {
        [ForeignValue::Float(x)] => vec![ForeignValue::Float(x.sqrt())],
        [ForeignValue::Int(n)] => vec![ForeignValue::Float((*n as f64).sqrt())],
        _ => vec![],
    });
    registry.register("math", "divmod", |args| match args.as_slice() {
        [ForeignValue::Int(a), ForeignValue::Int(b)] if *b != 0 => {
            vec![ForeignValue::Int(a / b), ForeignValue::Int(a % b)]
        }
        _ => vec![],
    });
    registry.register("strings", "upper", |args| match args.as_slice() {
        [ForeignValue::Str(s)] => vec![ForeignValue::Str(s.to_uppercase())],
        _ => vec![],
    });
    registry.register("strings", "len", |args| match args.as_slice() {
        [ForeignValue::Str(s)] => vec![ForeignValue::Int(s.chars().count() as i64)],
        _ => vec![],
    });
    registry.register("os", "getpid", |_| {
        vec![ForeignValue::Unsupported("process handle".into())]
    });

    registry
}

fn run_once(program: &str) {
    let mut interp = Interpreter::with_bridge(demo_registry());
    println!("=> {program}");
    if !eval_and_print(&mut interp, program) {
        process::exit(1);
    }
}

fn run_repl() {
    println!("minilisp - a minimal Lisp interpreter");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };
    let mut interp = Interpreter::with_bridge(demo_registry());

    loop {
        match rl.readline("minilisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&interp);
                        continue;
                    }
                    ":macros" => {
                        print_macros(&interp);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                eval_and_print(&mut interp, line);
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Evaluate every form on the line and print one result per form. Returns false if any failed.
fn eval_and_print(interp: &mut Interpreter, line: &str) -> bool {
    let mut all_ok = true;
    for result in interp.eval_str(line) {
        match result {
            Ok(Some(value)) => println!("{value}"),
            Ok(None) => println!("nil"),
            Err(e) => {
                println!("Error: {e}");
                all_ok = false;
            }
        }
    }
    all_ok
}

fn print_help() {
    println!("minilisp commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :macros    - List defined macros");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Values:");
    println!("  Integers: 42, -5    Floats: 2.5, 1e3    Booleans: true, false");
    println!("  Strings: \"hello\"    Symbols: x, make-adder");
    println!();
    println!("Special forms:");
    println!("  (if c then else)  (def name value)  (func (params) body)  (func args body)");
    println!("  (quote x)  (first list)  (rest list)  (cons head list)");
    println!("  (def-macro name transformer)");
    println!();
    println!("Primitives: + - * = < > not list do");
    println!();
    println!("Foreign functions:");
    println!("  (math.sqrt 2.0)  (math.divmod 7 2)  (strings.upper \"hi\")  (strings.len \"hi\")");
    println!();
    println!("Examples:");
    println!("  (def square (func (x) (* x x)))");
    println!("  (square 7)");
    println!("  (def-macro twice (func (e) (cons (quote do) (cons e (cons e (quote ()))))))");
    println!("  (twice (+ 1 1))");
    println!();
}

fn print_environment(interp: &Interpreter) {
    let bindings = interp.environment().get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate primitives from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Expression::Callable(Callable::Primitive { .. }) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Primitives ({}):", builtins.len());
        let mut col = 0;
        for name in builtins {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

fn print_macros(interp: &Interpreter) {
    let names = interp.expander().macro_names();
    if names.is_empty() {
        println!("No macros defined.");
    } else {
        println!("Macros: {}", names.join(" "));
    }
}
