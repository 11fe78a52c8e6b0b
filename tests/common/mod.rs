#![allow(dead_code)]

use std::fs::File;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use procshim::{ALREADY_STARTED, Command, Factory, Input, OsFactory, Output, SysProcAttr};

pub use procshim_test_utils::{init_tracing, with_timeout};

/// A `sh -c` command built through the OS factory.
pub fn sh(script: &str) -> Box<dyn Command> {
    OsFactory::new().command("sh", &["-c", script])
}

type Mutator = Box<dyn Fn(&mut dyn Command)>;

/// Runs every setter and append mutator against a started command. Each must
/// panic with `ALREADY_STARTED` and leave the configuration as it was.
pub fn assert_every_setter_refused(cmd: &mut dyn Command) {
    let devnull = Arc::new(File::open("/dev/null").expect("open /dev/null"));
    let appended = Arc::clone(&devnull);

    let mutators: [(&str, Mutator); 12] = [
        ("set_path", Box::new(|c: &mut dyn Command| c.set_path("/bin/false"))),
        ("set_args", Box::new(|c: &mut dyn Command| c.set_args(vec!["other".into()]))),
        ("append_args", Box::new(|c: &mut dyn Command| c.append_args(&["more"]))),
        ("set_env", Box::new(|c: &mut dyn Command| c.set_env(Some(vec!["A=1".into()])))),
        ("append_env", Box::new(|c: &mut dyn Command| c.append_env(&["B=2"]))),
        ("set_dir", Box::new(|c: &mut dyn Command| c.set_dir(Path::new("/")))),
        ("set_stdin", Box::new(|c: &mut dyn Command| c.set_stdin(Some(Input::Inherit)))),
        ("set_stdout", Box::new(|c: &mut dyn Command| c.set_stdout(Some(Output::Inherit)))),
        ("set_stderr", Box::new(|c: &mut dyn Command| c.set_stderr(Some(Output::Inherit)))),
        (
            "set_extra_files",
            Box::new(move |c: &mut dyn Command| c.set_extra_files(vec![Arc::clone(&devnull)])),
        ),
        (
            "append_extra_files",
            Box::new(move |c: &mut dyn Command| {
                c.append_extra_files(std::slice::from_ref(&appended))
            }),
        ),
        (
            "set_sys_proc_attr",
            Box::new(|c: &mut dyn Command| c.set_sys_proc_attr(Some(SysProcAttr::default()))),
        ),
    ];

    let path = cmd.path().to_string();
    let args = cmd.args().to_vec();
    let env = cmd.env().map(<[String]>::to_vec);
    let dir = cmd.dir().to_path_buf();
    let (had_stdin, had_stdout, had_stderr) =
        (cmd.stdin().is_some(), cmd.stdout().is_some(), cmd.stderr().is_some());
    let extra_files = cmd.extra_files().len();
    let attr = cmd.sys_proc_attr().cloned();

    for (name, mutate) in &mutators {
        let payload = catch_unwind(AssertUnwindSafe(|| mutate(&mut *cmd)))
            .err()
            .unwrap_or_else(|| panic!("{name} succeeded after start"));
        assert_eq!(payload.downcast_ref::<&str>(), Some(&ALREADY_STARTED), "{name}");
    }

    assert_eq!(cmd.path(), path);
    assert_eq!(cmd.args(), args);
    assert_eq!(cmd.env().map(<[String]>::to_vec), env);
    assert_eq!(cmd.dir(), dir);
    assert_eq!(cmd.stdin().is_some(), had_stdin);
    assert_eq!(cmd.stdout().is_some(), had_stdout);
    assert_eq!(cmd.stderr().is_some(), had_stderr);
    assert_eq!(cmd.extra_files().len(), extra_files);
    assert_eq!(cmd.sys_proc_attr().cloned(), attr);
}
