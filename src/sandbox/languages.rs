use crate::db::types::Language;

/// Per-language toolchain profile: where the source lands in the
/// scratch directory, how it is compiled (if at all) and how it is
/// run. All argv entries are relative to the scratch directory, which
/// is also the working directory of every spawned process.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LanguageProfile {
    pub(crate) source_filename: &'static str,
    compile: Option<&'static [&'static str]>,
    run: &'static [&'static str],
}

impl LanguageProfile {
    pub(crate) fn for_language(language: Language) -> &'static LanguageProfile {
        match language {
            Language::Python => &PYTHON,
            Language::Javascript => &JAVASCRIPT,
            Language::Java => &JAVA,
            Language::C => &C,
            Language::Cpp => &CPP,
        }
    }

    pub(crate) fn compile_argv(&self) -> Option<Vec<String>> {
        self.compile.map(|argv| argv.iter().map(|arg| arg.to_string()).collect())
    }

    pub(crate) fn run_argv(&self) -> Vec<String> {
        self.run.iter().map(|arg| arg.to_string()).collect()
    }

    pub(crate) fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }
}

// Python gets a syntax pre-check so malformed code surfaces once as a
// compile failure instead of failing every case at runtime.
static PYTHON: LanguageProfile = LanguageProfile {
    source_filename: "main.py",
    compile: Some(&["python3", "-m", "py_compile", "main.py"]),
    run: &["python3", "main.py"],
};

static JAVASCRIPT: LanguageProfile = LanguageProfile {
    source_filename: "main.js",
    compile: None,
    run: &["node", "main.js"],
};

// Class must be named Main; the authoring UI enforces this convention.
static JAVA: LanguageProfile = LanguageProfile {
    source_filename: "Main.java",
    compile: Some(&["javac", "Main.java"]),
    run: &["java", "-cp", ".", "Main"],
};

static C: LanguageProfile = LanguageProfile {
    source_filename: "main.c",
    compile: Some(&["gcc", "-O2", "-std=c17", "-o", "solution", "main.c"]),
    run: &["./solution"],
};

static CPP: LanguageProfile = LanguageProfile {
    source_filename: "main.cpp",
    compile: Some(&["g++", "-O2", "-std=c++17", "-o", "solution", "main.cpp"]),
    run: &["./solution"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreted_languages_have_no_compile_step() {
        assert!(!LanguageProfile::for_language(Language::Javascript).needs_compile());
    }

    #[test]
    fn python_has_syntax_precheck() {
        let profile = LanguageProfile::for_language(Language::Python);
        assert!(profile.needs_compile());
        assert_eq!(profile.run_argv(), vec!["python3", "main.py"]);
    }

    #[test]
    fn compiled_languages_emit_solution_binary() {
        for language in [Language::C, Language::Cpp] {
            let profile = LanguageProfile::for_language(language);
            let compile = profile.compile_argv().expect("compile argv");
            assert!(compile.contains(&"solution".to_string()));
            assert_eq!(profile.run_argv(), vec!["./solution"]);
        }
    }

    #[test]
    fn java_runs_main_class() {
        let profile = LanguageProfile::for_language(Language::Java);
        assert_eq!(profile.source_filename, "Main.java");
        assert_eq!(profile.run_argv(), vec!["java", "-cp", ".", "Main"]);
    }
}
