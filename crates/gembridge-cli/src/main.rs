use std::{env, process::ExitCode, rc::Rc, time::Instant};

use gembridge::{
    ConnectionConfig, GemError, GemObject, HostValue, LoginParams, ProfilingTracer, Session, SessionBuilder,
    StderrTracer, sim::SimStone,
};

const USAGE: &str = "usage: gembridge [--trace | --profile] [--json] <connection.json | --sim> <expression>";

struct Options {
    trace: bool,
    profile: bool,
    json: bool,
    connection: Option<String>,
    expression: String,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut trace = false;
    let mut profile = false;
    let mut json = false;
    let mut sim = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--trace" => trace = true,
            "--profile" => profile = true,
            "--json" => json = true,
            "--sim" => sim = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
            _ => positional.push(arg.clone()),
        }
    }
    if trace && profile {
        return Err("--trace and --profile are mutually exclusive".to_owned());
    }
    let (connection, expression) = match (sim, positional.as_slice()) {
        (true, [expression]) => (None, expression.clone()),
        (false, [connection, expression]) => (Some(connection.clone()), expression.clone()),
        _ => return Err(USAGE.to_owned()),
    };
    Ok(Options {
        trace,
        profile,
        json,
        connection,
        expression,
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let profiler = ProfilingTracer::new();
    let mut builder = Session::builder();
    if options.trace {
        builder = builder.tracer(StderrTracer::new());
    } else if options.profile {
        builder = builder.tracer(profiler.clone());
    }

    let start = Instant::now();
    let session = match login(builder, options.connection.as_deref()) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("login failed: {err}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("logged in after {:?}", start.elapsed());

    let status = match run(&session, &options.expression) {
        Ok(output) => {
            if options.json {
                println!("{}", output.to_json_value());
            } else {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    };
    eprintln!("finished after {:?}", start.elapsed());

    if let Err(err) = session.logout() {
        eprintln!("logout failed: {err}");
    }
    if options.profile {
        eprintln!("{}", profiler.report());
    }
    status
}

fn login(builder: SessionBuilder, connection: Option<&str>) -> Result<Session, GemError> {
    match connection {
        Some(path) => builder.connect(&ConnectionConfig::load(path)?),
        None => builder.login_rpc(Rc::new(SimStone::new()), &LoginParams::new("DataCurator", "swordfish")),
    }
}

/// Executes `expression` and converts the answer, keeping the proxy when it has no host form.
fn run(session: &Session, expression: &str) -> Result<HostValue, GemError> {
    let answer: GemObject = session.execute(expression, None, None)?;
    match answer.to_host() {
        Err(GemError::Unsupported(_)) => Ok(HostValue::Object(answer)),
        other => other,
    }
}

fn report(err: &GemError) {
    let Some(remote) = err.as_remote() else {
        eprintln!("error: {err}");
        return;
    };
    eprintln!("error {}: {}", remote.number(), remote.message());
    let description = remote.description();
    if description != remote.message() {
        eprintln!("  {description}");
    }
    if !remote.is_fatal() {
        // nothing will resume the suspended process
        if let Err(err) = remote.clear_stack() {
            eprintln!("  clearing the stack failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn sim_takes_only_an_expression() {
        let options = parse_args(&strings(&["--sim", "--json", "^3 + 4"])).unwrap();
        assert!(options.connection.is_none());
        assert!(options.json);
        assert_eq!(options.expression, "^3 + 4");
    }

    #[test]
    fn connection_file_comes_first() {
        let options = parse_args(&strings(&["--trace", "stone.json", "^nil"])).unwrap();
        assert_eq!(options.connection.as_deref(), Some("stone.json"));
        assert!(options.trace);
        assert!(parse_args(&strings(&["stone.json"])).is_err());
        assert!(parse_args(&strings(&["--trace", "--profile", "--sim", "^1"])).is_err());
    }

    #[test]
    fn runs_against_the_simulated_stone() {
        let session = login(Session::builder(), None).unwrap();
        let value = run(&session, "^'abc' size + 1").unwrap();
        assert_eq!(value, HostValue::Int(4));
        let value = run(&session, "^Object new").unwrap();
        assert!(matches!(value, HostValue::Object(_)));
    }
}
