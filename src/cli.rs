use std::env;
use std::io::{self, Write};
use knnreg::buffer::{BufferAdaptor, VecBuffer};
use knnreg::Workspace;

pub enum Command {
    Add { dataset: String, id: String, vec: Vec<f64> },
    Get { dataset: String, id: String },
    Update { dataset: String, id: String, vec: Vec<f64> },
    Delete { dataset: String, id: String },
    Print { dataset: String },
    Size { dataset: String },
    Cols { dataset: String },
    Clear { dataset: Option<String> },
    Fit { source: String, target: String },
    PredictPoint { vec: Vec<f64> },
    Predict { source: String, dest: String },
    Set { name: String, value: String },
    Model,
    Dump { path: String },
    Read { path: String },
    Save { path: String },
    Load { path: String },
}

const COMMANDS: &str = "add, get, update, delete, print, size, cols, clear, fit, predictpoint, predict, set, model, dump, read, save, load";

/// Parse a command from a provided argument vector
/// This is used both for command-line args and REPL input
pub fn parse_command_from_args(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err(format!("No command provided. Use: {}", COMMANDS));
    }

    let command = &args[1];

    match command.as_str() {
        "add" => parse_point_command(args, "add").map(|(dataset, id, vec)| Command::Add { dataset, id, vec }),
        "update" => parse_point_command(args, "update").map(|(dataset, id, vec)| Command::Update { dataset, id, vec }),
        "get" => parse_two(args, "get", "<dataset> <id>").map(|(dataset, id)| Command::Get { dataset, id }),
        "delete" => parse_two(args, "delete", "<dataset> <id>").map(|(dataset, id)| Command::Delete { dataset, id }),
        "print" => parse_one(args, "print", "<dataset>").map(|dataset| Command::Print { dataset }),
        "size" => parse_one(args, "size", "<dataset>").map(|dataset| Command::Size { dataset }),
        "cols" => parse_one(args, "cols", "<dataset>").map(|dataset| Command::Cols { dataset }),
        "clear" => Ok(Command::Clear { dataset: args.get(2).cloned() }),
        "fit" => parse_two(args, "fit", "<source> <target>").map(|(source, target)| Command::Fit { source, target }),
        "predictpoint" => parse_predict_point(args),
        "predict" => parse_two(args, "predict", "<source> <dest>").map(|(source, dest)| Command::Predict { source, dest }),
        "set" => parse_two(args, "set", "<k|weight> <value>").map(|(name, value)| Command::Set { name, value }),
        "model" => Ok(Command::Model),
        "dump" => parse_one(args, "dump", "<path>").map(|path| Command::Dump { path }),
        "read" => parse_one(args, "read", "<path>").map(|path| Command::Read { path }),
        "save" => parse_one(args, "save", "<path>").map(|path| Command::Save { path }),
        "load" => parse_one(args, "load", "<path>").map(|path| Command::Load { path }),
        _ => Err(format!("Unknown command: {}. Available: {}", command, COMMANDS)),
    }
}

fn parse_vector(values: &[String]) -> Result<Vec<f64>, String> {
    values.iter()
        .map(|s| s.parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| "Failed to parse vector components as numbers".to_string())
}

/// Parse 'add' / 'update'
/// Usage: knnreg add <dataset> <id> <v1> <v2> ...
fn parse_point_command(args: &[String], name: &str) -> Result<(String, String, Vec<f64>), String> {
    // args[0] = program name
    // args[1] = command
    // args[2] = dataset, args[3] = id
    // args[4..] = vector (required, at least 1)
    if args.len() < 5 {
        return Err(format!("'{}' command requires a dataset, an ID and a vector. Usage: {} <dataset> <id> <vector>", name, name));
    }

    let vec = parse_vector(&args[4..])?;
    Ok((args[2].clone(), args[3].clone(), vec))
}

/// Parse the 'predictpoint' command
/// Usage: knnreg predictpoint <v1> <v2> ...
fn parse_predict_point(args: &[String]) -> Result<Command, String> {
    if args.len() < 3 {
        return Err("'predictpoint' command requires at least one vector component. Usage: predictpoint <v1> <v2> ...".to_string());
    }

    Ok(Command::PredictPoint { vec: parse_vector(&args[2..])? })
}

fn parse_one(args: &[String], name: &str, usage: &str) -> Result<String, String> {
    if args.len() < 3 {
        return Err(format!("'{}' command requires an argument. Usage: {} {}", name, name, usage));
    }
    if args.len() > 3 {
        eprintln!("Warning: '{}' command takes one argument, ignoring extras", name);
    }

    Ok(args[2].clone())
}

fn parse_two(args: &[String], name: &str, usage: &str) -> Result<(String, String), String> {
    if args.len() < 4 {
        return Err(format!("'{}' command requires two arguments. Usage: {} {}", name, name, usage));
    }

    Ok((args[2].clone(), args[3].clone()))
}

/// REPL mode - interactive session with an in-memory workspace
pub fn run_repl(ws: &mut Workspace) {
    println!("knnreg - k-nearest-neighbour regression");
    println!("Type 'help' for commands, 'exit' or 'quit' to quit\n");

    loop {
        print!("knnreg> ");
        if let Err(error) = io::stdout().flush() {
            eprintln!("Error writing prompt: {}", error);
        }

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                eprintln!("Error reading input: {}", error);
                continue;
            }
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input == "exit" || input == "quit" {
            println!("Goodbye!");
            break;
        }

        if input == "help" {
            print_help();
            continue;
        }

        let mut args: Vec<String> = vec!["knnreg".to_string()];
        args.extend(input.split_whitespace().map(|s| s.to_string()));

        let command = match parse_command_from_args(&args) {
            Ok(cmd) => cmd,
            Err(error) => {
                eprintln!("Error: {}", error);
                continue;
            }
        };

        execute_command(ws, command);
    }
}

/// Single-command mode - load workspace from path, execute command, save back
/// Usage: knnreg <workspace_path> <command> [args...]
pub fn run_single_command() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: knnreg <workspace_path> <command> [args...]");
        std::process::exit(1);
    }

    let ws_path = &args[1];

    let mut ws = match Workspace::load_or_create(ws_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading '{}': {}", ws_path, e);
            std::process::exit(1);
        }
    };

    // Rebuild args: shift so args[1] becomes the command
    let shifted_args: Vec<String> = std::iter::once(args[0].clone())
        .chain(args[2..].iter().cloned())
        .collect();

    let command = match parse_command_from_args(&shifted_args) {
        Ok(cmd) => cmd,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    execute_command(&mut ws, command);

    if let Err(e) = ws.save(ws_path) {
        eprintln!("Error saving '{}': {}", ws_path, e);
        std::process::exit(1);
    }
}

fn report(result: knnreg::Result<()>, success: impl FnOnce()) {
    match result {
        Ok(()) => success(),
        Err(error) => eprintln!("Error [{}]: {}", error.status(), error),
    }
}

fn execute_command(ws: &mut Workspace, command: Command) {
    match command {
        Command::Add { dataset, id, vec } => {
            let buffer = VecBuffer::new(vec);
            report(ws.add_point(&dataset, &id, Some(&buffer)),
                || println!("Added '{}' to '{}'", id, dataset));
        }

        Command::Get { dataset, id } => {
            let Some(ds) = ws.dataset(&dataset) else {
                eprintln!("Error [NoDataSet]: dataset '{}' not found", dataset);
                return;
            };
            let mut buffer = VecBuffer::default();
            let result = ds.get_point(&id, Some(&mut buffer));
            report(result, || println!("Point '{}': {:?}", id, buffer.samples()));
        }

        Command::Update { dataset, id, vec } => {
            let buffer = VecBuffer::new(vec);
            report(ws.update_point(&dataset, &id, Some(&buffer)),
                || println!("Updated '{}' in '{}'", id, dataset));
        }

        Command::Delete { dataset, id } => {
            report(ws.delete_point(&dataset, &id),
                || println!("Deleted '{}' from '{}'", id, dataset));
        }

        Command::Print { dataset } => match ws.dataset(&dataset) {
            Some(ds) => print!("{}", ds.print()),
            None => eprintln!("Error [NoDataSet]: dataset '{}' not found", dataset),
        },

        Command::Size { dataset } => println!("{}", ws.dataset(&dataset).map_or(0, |ds| ds.size())),

        Command::Cols { dataset } => println!("{}", ws.dataset(&dataset).map_or(0, |ds| ds.cols())),

        Command::Clear { dataset: Some(dataset) } => {
            report(ws.clear_dataset(&dataset), || println!("Cleared '{}'", dataset));
        }

        Command::Clear { dataset: None } => {
            ws.regressor_mut().clear();
            println!("Cleared model");
        }

        Command::Fit { source, target } => {
            report(ws.fit(&source, &target),
                || println!("Fitted {} points", ws.regressor().size()));
        }

        Command::PredictPoint { vec } => {
            let buffer = VecBuffer::new(vec);
            match ws.regressor().predict_point(Some(&buffer)) {
                Ok(prediction) => println!("{}", prediction),
                Err(error) => eprintln!("Error [{}]: {}", error.status(), error),
            }
        }

        Command::Predict { source, dest } => match ws.predict(&source, &dest) {
            Ok(count) => println!("Wrote {} predictions to '{}'", count, dest),
            Err(error) => eprintln!("Error [{}]: {}", error.status(), error),
        },

        Command::Set { name, value } => match ws.regressor_mut().params_mut().set(&name, &value) {
            Ok(()) => println!("{} = {}", name, value),
            Err(error) => eprintln!("Error: {}", error),
        },

        Command::Model => {
            let regressor = ws.regressor();
            let params = regressor.params();
            println!("size: {} cols: {} k: {} weight: {}",
                regressor.size(), regressor.cols(), params.num_neighbours,
                if params.weight { "on" } else { "off" });
        }

        Command::Dump { path } => {
            report(ws.regressor().write(&path), || println!("Model written to '{}'", path));
        }

        Command::Read { path } => {
            report(ws.regressor_mut().read(&path), || println!("Model read from '{}'", path));
        }

        Command::Save { path } => {
            report(ws.save(&path), || println!("Workspace saved to '{}'", path));
        }

        Command::Load { path } => match Workspace::load(&path) {
            Ok(loaded) => {
                *ws = loaded;
                println!("Workspace loaded from '{}' ({} datasets)", path, ws.dataset_names().count());
            }
            Err(error) => eprintln!("Error [{}]: {}", error.status(), error),
        },
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  add <ds> <id> <v1> <v2> ...      - Add a point to a dataset");
    println!("  get <ds> <id>                    - Retrieve a point by ID");
    println!("  update <ds> <id> <v1> <v2> ...   - Replace a point");
    println!("  delete <ds> <id>                 - Delete a point");
    println!("  print <ds>                       - Summarize a dataset");
    println!("  size <ds> / cols <ds>            - Dataset point count / dimension");
    println!("  clear [ds]                       - Clear a dataset, or the model");
    println!("  fit <source> <target>            - Fit the regressor");
    println!("  predictpoint <v1> <v2> ...       - Predict one value");
    println!("  predict <source> <dest>          - Predict every point of a dataset");
    println!("  set k <n> / set weight on|off    - Set regressor parameters");
    println!("  model                            - Show model size and parameters");
    println!("  dump <path> / read <path>        - Write / read the model as JSON");
    println!("  save <path> / load <path>        - Save / load the whole workspace");
    println!("  help                             - Show this help");
    println!("  exit, quit                       - Exit the program");
}
