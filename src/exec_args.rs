//! A helper for calling exec out of a list of Strings.
//!
//! The exec family of syscalls wants `*const *const c_char`: a list of
//! NUL-terminated strings which is, itself, NULL-terminated. Everything here
//! is built before fork so the child never allocates.
use std::{
    ffi::{CString, NulError},
    os::unix::ffi::OsStringExt,
};

use nix::libc;
use which::which;

#[derive(Clone, Debug)]
pub struct ExecArgs {
    name: String,
    args: Vec<CString>,
}

impl ExecArgs {
    pub fn new(command: &[String]) -> Result<Self, NulError> {
        let args = command
            .iter()
            .map(|s| CString::new(s.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: command.first().cloned().unwrap_or_default(),
            args,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the executable through `PATH`. When that fails the bare name
    /// is returned and `execvp` gets to report the failure from the child.
    pub fn program(&self) -> CString {
        which(&self.name)
            .ok()
            .and_then(|path| CString::new(path.into_os_string().into_vec()).ok())
            .or_else(|| self.args.first().cloned())
            .unwrap_or_default()
    }

    pub fn to_argv(&self) -> Vec<*const libc::c_char> {
        let mut argv: Vec<*const libc::c_char> = self.args.iter().map(|s| s.as_ptr()).collect();

        argv.push(std::ptr::null());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(args: &[&str]) -> ExecArgs {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        ExecArgs::new(&owned).unwrap()
    }

    #[test]
    fn argv_is_null_terminated() {
        let exec = exec(&["sh", "-c", "true"]);
        let argv = exec.to_argv();
        assert_eq!(argv.len(), 4);
        assert!(argv[3].is_null());
        assert_eq!(exec.name(), "sh");
    }

    #[test]
    fn program_resolves_through_path() {
        let program = exec(&["sh"]).program();
        let program = program.to_str().unwrap();
        assert!(program.starts_with('/'), "{program}");
        assert!(program.ends_with("/sh"));
    }

    #[test]
    fn unresolvable_program_keeps_its_name() {
        let program = exec(&["wmagent-no-such-wm"]).program();
        assert_eq!(program.to_str().unwrap(), "wmagent-no-such-wm");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let owned = vec!["w\0m".to_string()];
        assert!(ExecArgs::new(&owned).is_err());
    }
}
