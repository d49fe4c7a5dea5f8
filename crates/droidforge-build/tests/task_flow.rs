#![cfg(unix)]

mod common;

use std::fs;
use std::path::PathBuf;

use droidforge_build::artifacts::{
    CLASSES_JAR, DEX_FILES, JAVA_CLASSES, KOTLIN_CLASSES, NATIVE_LIBS_DIR, RESOLVED_CLASSPATH,
    RESOURCE_APK,
};
use droidforge_build::tasks::{
    CompileJavaTask, CompileKotlinTask, CompileNativeTask, ConvertToDexTask, OptimizeTask,
    ProcessResourcesTask,
};
use droidforge_build::{BuildSession, Task};
use droidforge_core::abi::Abi;
use droidforge_core::BuildPhase;

use common::{files_with_extension, write_script, Fixture};

const FAKE_JAVAC: &str = r#"out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-d" ]; then out="$arg"; fi
  prev="$arg"
done
mkdir -p "$out/com/example"
echo class > "$out/com/example/Main.class"
"#;

/// Java runtime standing in for compiler jars and R8: `-d` gets a class,
/// `--output` gets a `classes.dex` holding `dex_body`.
fn fake_java(dex_body: &str) -> String {
    format!(
        r#"classes=""
dex=""
prev=""
for arg in "$@"; do
  case "$prev" in
    -d) classes="$arg" ;;
    --output) dex="$arg" ;;
  esac
  prev="$arg"
done
if [ -n "$classes" ]; then
  mkdir -p "$classes/com/example"
  echo class > "$classes/com/example/Main.class"
fi
if [ -n "$dex" ]; then
  mkdir -p "$dex"
  printf '%s' '{}' > "$dex/classes.dex"
fi
"#,
        dex_body
    )
}

/// Release session holding an app jar, one library jar and a d8 output of
/// `dex_size` bytes.
fn release_dex_session(fixture: &Fixture, dex_size: usize) -> (BuildSession, PathBuf, PathBuf) {
    let session = fixture.session(fixture.project(false, vec![]).with_debug(false));
    let inputs = fixture.temp.path().join("inputs");
    fs::create_dir_all(&inputs).expect("inputs dir");
    let classes_jar = inputs.join("classes.jar");
    let library_jar = inputs.join("gson-2.10.1.jar");
    fs::write(&classes_jar, b"PK\x03\x04app").expect("classes jar");
    fs::write(&library_jar, b"PK\x03\x04lib").expect("library jar");
    let dex = inputs.join("classes.dex");
    fs::write(&dex, vec![b'd'; dex_size]).expect("dex");
    session.put(CLASSES_JAR, classes_jar);
    session.put(RESOLVED_CLASSPATH, vec![library_jar.clone()]);
    session.put(DEX_FILES, vec![dex.clone()]);
    (session, library_jar, dex)
}

fn install_d8_jar(fixture: &Fixture) {
    let lib = fixture.build_tools_dir().join("lib");
    fs::create_dir_all(&lib).expect("build-tools lib");
    fs::write(lib.join("d8.jar"), b"PK\x03\x04d8").expect("d8.jar");
}

fn write_kotlin_source(fixture: &Fixture) {
    let dir = fixture.project_dir.join("src/main/kotlin/com/example");
    fs::create_dir_all(&dir).expect("kotlin dir");
    fs::write(dir.join("Main.kt"), "package com.example\nclass Main").expect("kotlin source");
}

#[test]
fn native_task_is_a_no_op_when_disabled() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    fixture.write_native_sources();
    let session = fixture.session(fixture.project(false, vec![Abi::Arm64V8a]));

    CompileNativeTask.execute(&session).expect("native disabled");

    assert!(session.get(NATIVE_LIBS_DIR).is_none());
    assert!(fixture.tool_calls().is_empty());
    assert!(!session.intermediate("native").exists());
}

#[test]
fn native_task_with_no_abis_compiles_nothing() {
    let fixture = Fixture::new();
    fixture.write_native_sources();
    let session = fixture.session(fixture.project(true, vec![]));

    CompileNativeTask.execute(&session).expect("no abis");

    assert!(session.get(NATIVE_LIBS_DIR).is_none());
    assert!(fixture.tool_calls().is_empty());
    assert!(session.logs().iter().any(|line| line.contains("no matching ABIs")));
}

#[test]
fn native_task_compiles_every_selected_abi_directly() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    fixture.write_native_sources();
    let session = fixture.session(fixture.project(true, vec![Abi::Arm64V8a, Abi::X86_64]));

    CompileNativeTask.execute(&session).expect("direct compile");

    let native = session.get(NATIVE_LIBS_DIR).expect("native output");
    assert!(native.join("arm64-v8a/libdemo.so").is_file());
    assert!(native.join("x86_64/libdemo.so").is_file());
    assert!(!native.join("armeabi-v7a").exists());

    let calls = fixture.tool_calls();
    let compiles = calls.iter().filter(|call| call.contains(" -c ")).count();
    assert_eq!(compiles, 4);
    assert!(calls
        .iter()
        .any(|call| call.contains("--target=aarch64-linux-android24")));
    assert!(calls.iter().any(|call| call.contains("-soname,libdemo.so")));
    assert!(session
        .warnings()
        .iter()
        .any(|warning| warning.contains("no sysroot libraries")));
}

#[test]
fn dex_conversion_without_a_converter_fails() {
    let fixture = Fixture::new();
    let session = fixture.session(fixture.project(false, vec![]));
    let classes = session.intermediate("classes/java");
    fs::create_dir_all(classes.join("com/example")).expect("classes dir");
    fs::write(classes.join("com/example/Main.class"), b"\xca\xfe\xba\xbe").expect("class");
    session.put(JAVA_CLASSES, classes);

    let error = ConvertToDexTask
        .execute(&session)
        .expect_err("no converter installed");

    assert_eq!(error.phase, BuildPhase::DexConversion);
    assert!(error.to_string().contains("no usable dex converter"), "{}", error);
    assert!(files_with_extension(&session.intermediate("dex/out"), "dex").is_empty());
    assert!(session.get(DEX_FILES).is_none());
}

#[test]
fn dex_conversion_with_no_classes_yields_no_dex_files() {
    let fixture = Fixture::new();
    let session = fixture.session(fixture.project(false, vec![]));

    ConvertToDexTask.execute(&session).expect("nothing to convert");

    assert_eq!(session.get(DEX_FILES), Some(Vec::new()));
}

#[test]
fn java_compile_is_skipped_until_a_source_changes() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    fixture.install_host_tool("javac", FAKE_JAVAC);
    let source_dir = fixture.project_dir.join("src/main/java/com/example");
    fs::create_dir_all(&source_dir).expect("java dir");
    let source = source_dir.join("Main.java");
    fs::write(&source, "package com.example; class Main {}").expect("source");

    let javac_calls = |fixture: &Fixture| {
        fixture
            .tool_calls()
            .iter()
            .filter(|call| call.starts_with("javac "))
            .count()
    };

    let first = fixture.session(fixture.project(false, vec![]));
    CompileJavaTask.execute(&first).expect("first compile");
    let output = first.get(JAVA_CLASSES).expect("classes");
    assert!(output.join("com/example/Main.class").is_file());
    assert_eq!(javac_calls(&fixture), 1);

    let second = fixture.session(fixture.project(false, vec![]));
    CompileJavaTask.execute(&second).expect("up to date");
    assert_eq!(second.get(JAVA_CLASSES), Some(output.clone()));
    assert_eq!(javac_calls(&fixture), 1);

    fs::write(&source, "package com.example; class Main { int answer; }").expect("edit");
    let third = fixture.session(fixture.project(false, vec![]));
    CompileJavaTask.execute(&third).expect("recompile");
    assert_eq!(javac_calls(&fixture), 2);
}

#[test]
fn resource_processing_requires_a_manifest() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    let session = fixture.session(fixture.project(false, vec![]));

    let error = ProcessResourcesTask
        .execute(&session)
        .expect_err("missing manifest");

    assert_eq!(error.phase, BuildPhase::ResourceProcessing);
    assert!(error.to_string().contains("manifest not found"), "{}", error);
    assert!(session.get(RESOURCE_APK).is_none());
    assert!(fixture.tool_calls().is_empty());
}

#[test]
fn optimizer_shrinks_app_and_library_classes_together() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    install_d8_jar(&fixture);
    fixture.install_host_tool("java", &fake_java("r8"));
    let (session, library_jar, _) = release_dex_session(&fixture, 4096);

    OptimizeTask.execute(&session).expect("optimize");

    let optimized = session.get(DEX_FILES).expect("dex files");
    assert_eq!(optimized, vec![session.intermediate("optimize/out/classes.dex")]);
    let calls = fixture.tool_calls();
    let r8 = calls
        .iter()
        .find(|call| call.contains("com.android.tools.r8.R8"))
        .expect("r8 call");
    assert!(r8.contains("--release"));
    assert!(r8.contains(&library_jar.display().to_string()), "{}", r8);
    assert!(r8.contains("classes.jar"), "{}", r8);
    assert!(fs::read_to_string(session.intermediate("optimize/default-rules.pro"))
        .expect("generated rules")
        .contains("-keep class com.example.app.**"));
}

#[test]
fn optimizer_output_that_is_not_smaller_is_discarded() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    install_d8_jar(&fixture);
    fixture.install_host_tool("java", &fake_java("a considerably larger dex file"));
    let (session, _, dex) = release_dex_session(&fixture, 4);

    OptimizeTask.execute(&session).expect("optimize");

    assert_eq!(session.get(DEX_FILES), Some(vec![dex]));
    assert!(session.logs().iter().any(|line| line.contains("keeping original")));
}

#[test]
fn optimizer_failure_is_only_a_warning() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    install_d8_jar(&fixture);
    fixture.install_host_tool("java", "echo 'R8: missing class' >&2\nexit 3\n");
    let (session, _, dex) = release_dex_session(&fixture, 4096);

    OptimizeTask.execute(&session).expect("failure tolerated");

    assert_eq!(session.get(DEX_FILES), Some(vec![dex]));
    assert!(session
        .warnings()
        .iter()
        .any(|warning| warning.starts_with("optimization failed")));
}

#[test]
fn optimizer_without_d8_jar_is_skipped_with_a_warning() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    fixture.install_host_tool("java", &fake_java("r8"));
    let (session, _, dex) = release_dex_session(&fixture, 4096);

    OptimizeTask.execute(&session).expect("unavailable tolerated");

    assert_eq!(session.get(DEX_FILES), Some(vec![dex]));
    assert!(session
        .warnings()
        .iter()
        .any(|warning| warning.contains("optimizer unavailable")));
    assert!(fixture.tool_calls().is_empty());
}

#[test]
fn debug_builds_skip_the_optimizer() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    install_d8_jar(&fixture);
    fixture.install_host_tool("java", &fake_java("r8"));
    let session = fixture.session(fixture.project(false, vec![]));
    let dex = fixture.temp.path().join("classes.dex");
    fs::write(&dex, vec![b'd'; 4096]).expect("dex");
    session.put(CLASSES_JAR, fixture.temp.path().join("classes.jar"));
    session.put(DEX_FILES, vec![dex.clone()]);

    OptimizeTask.execute(&session).expect("debug build");

    assert_eq!(session.get(DEX_FILES), Some(vec![dex]));
    assert!(fixture.tool_calls().is_empty());
    assert!(!session.intermediate("optimize").exists());
}

#[test]
fn kotlin_uses_the_bundled_compiler_jar_when_present() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    write_kotlin_source(&fixture);
    let jars = fixture.install_root().join("jars");
    fs::create_dir_all(&jars).expect("jars dir");
    fs::write(jars.join("kotlin-compiler.jar"), b"PK\x03\x04kotlin").expect("compiler jar");
    fixture.install_host_tool("java", &fake_java("unused"));
    fixture.install_host_tool("kotlinc", FAKE_JAVAC);
    let session = fixture.session(fixture.project(false, vec![]));

    CompileKotlinTask.execute(&session).expect("bundled compile");

    let classes = session.get(KOTLIN_CLASSES).expect("kotlin classes");
    assert!(classes.join("com/example/Main.class").is_file());
    let calls = fixture.tool_calls();
    assert!(calls
        .iter()
        .any(|call| call.starts_with("java ") && call.contains("org.jetbrains.kotlin.cli.jvm.K2JVMCompiler")));
    assert!(!calls.iter().any(|call| call.starts_with("kotlinc ")));
}

#[test]
fn kotlin_falls_back_to_host_kotlinc_without_the_bundled_jar() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    write_kotlin_source(&fixture);
    fixture.install_host_tool("java", &fake_java("unused"));
    fixture.install_host_tool("kotlinc", FAKE_JAVAC);
    let session = fixture.session(fixture.project(false, vec![]));

    CompileKotlinTask.execute(&session).expect("host compile");

    assert!(session
        .get(KOTLIN_CLASSES)
        .expect("kotlin classes")
        .join("com/example/Main.class")
        .is_file());
    let calls = fixture.tool_calls();
    assert!(calls.iter().any(|call| call.starts_with("kotlinc ")));
    assert!(!calls.iter().any(|call| call.starts_with("java ")));
    let logs = session.logs();
    assert!(logs
        .iter()
        .any(|line| line.contains("bundled kotlin compiler unavailable (kotlin-compiler.jar not installed)")));
    assert!(logs.iter().any(|line| line == "Kotlin compiler: used kotlinc"));
}

#[test]
fn java_falls_back_to_host_javac_without_bundled_ecj() {
    let fixture = Fixture::new();
    fixture.install_sdk();
    fixture.install_host_tool("java", &fake_java("unused"));
    fixture.install_host_tool("javac", FAKE_JAVAC);
    let source_dir = fixture.project_dir.join("src/main/java/com/example");
    fs::create_dir_all(&source_dir).expect("java dir");
    fs::write(source_dir.join("Main.java"), "package com.example; class Main {}").expect("source");
    let session = fixture.session(fixture.project(false, vec![]));

    CompileJavaTask.execute(&session).expect("host compile");

    let logs = session.logs();
    assert!(logs.iter().any(|line| line.contains("bundled ecj unavailable (ecj.jar not installed)")));
    assert!(logs.iter().any(|line| line == "Java compiler: used javac"));
    assert!(!fixture.tool_calls().iter().any(|call| call.starts_with("java ")));
}

const FAKE_CMAKE: &str = r#"libdir=""
for arg in "$@"; do
  case "$arg" in
    -DCMAKE_LIBRARY_OUTPUT_DIRECTORY=*) libdir="${arg#-DCMAKE_LIBRARY_OUTPUT_DIRECTORY=}" ;;
  esac
done
if [ -n "$libdir" ]; then
  mkdir -p "$libdir"
  echo so > "$libdir/libdemo.so"
fi
"#;

const FAKE_NDK_BUILD: &str = r#"#!/bin/sh
echo "ndk-build $*" >> '{log}'
libs=""
abi=""
for arg in "$@"; do
  case "$arg" in
    NDK_LIBS_OUT=*) libs="${arg#NDK_LIBS_OUT=}" ;;
    APP_ABI=*) abi="${arg#APP_ABI=}" ;;
  esac
done
mkdir -p "$libs/$abi"
echo so > "$libs/$abi/libdemo.so"
"#;

fn install_ndk_build(fixture: &Fixture) {
    let script = FAKE_NDK_BUILD.replace("{log}", &fixture.tool_log.display().to_string());
    write_script(&fixture.install_root().join("ndk/r27b/ndk-build"), &script);
}

fn write_native_script(fixture: &Fixture, name: &str) {
    fs::write(fixture.project_dir.join("src/main/cpp").join(name), "# build script\n")
        .expect("build script");
}

#[test]
fn native_task_prefers_cmake_when_a_cmake_project_exists() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    fixture.write_native_sources();
    write_native_script(&fixture, "CMakeLists.txt");
    fixture.install_host_tool("cmake", FAKE_CMAKE);
    let session = fixture.session(fixture.project(true, vec![Abi::Arm64V8a]));

    CompileNativeTask.execute(&session).expect("cmake build");

    let native = session.get(NATIVE_LIBS_DIR).expect("native output");
    assert!(native.join("arm64-v8a/libdemo.so").is_file());
    let calls = fixture.tool_calls();
    assert!(calls
        .iter()
        .any(|call| call.starts_with("cmake -S") && call.contains("-DANDROID_ABI=arm64-v8a")));
    assert!(calls.iter().any(|call| call.starts_with("cmake --build")));
    assert!(!calls.iter().any(|call| call.starts_with("clang")));
}

#[test]
fn native_task_uses_ndk_build_for_android_mk_projects() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    install_ndk_build(&fixture);
    fixture.write_native_sources();
    write_native_script(&fixture, "Android.mk");
    let session = fixture.session(fixture.project(true, vec![Abi::X86_64]));

    CompileNativeTask.execute(&session).expect("ndk-build");

    let native = session.get(NATIVE_LIBS_DIR).expect("native output");
    assert!(native.join("x86_64/libdemo.so").is_file());
    let calls = fixture.tool_calls();
    assert!(calls
        .iter()
        .any(|call| call.starts_with("ndk-build") && call.contains("APP_ABI=x86_64")));
    assert!(!calls.iter().any(|call| call.starts_with("clang")));
    assert!(session
        .logs()
        .iter()
        .any(|line| line.contains("cmake unavailable (no CMakeLists.txt)")));
}

#[test]
fn native_task_compiles_directly_when_ndk_build_is_missing() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    fixture.write_native_sources();
    write_native_script(&fixture, "Android.mk");
    let session = fixture.session(fixture.project(true, vec![Abi::Arm64V8a]));

    CompileNativeTask.execute(&session).expect("direct compile");

    assert!(session
        .get(NATIVE_LIBS_DIR)
        .expect("native output")
        .join("arm64-v8a/libdemo.so")
        .is_file());
    assert!(session
        .logs()
        .iter()
        .any(|line| line.contains("ndk-build unavailable (ndk-build not found)")));
    assert!(fixture.tool_calls().iter().any(|call| call.contains(" -c ")));
}

#[test]
fn native_objects_keep_source_directories_apart() {
    let fixture = Fixture::new();
    fixture.install_ndk(None);
    let cpp = fixture.project_dir.join("src/main/cpp");
    fs::create_dir_all(cpp.join("a")).expect("nested dir");
    fs::write(cpp.join("a/b.c"), "int nested(void) { return 1; }").expect("nested");
    fs::write(cpp.join("a_b.c"), "int flat(void) { return 2; }").expect("flat");
    let session = fixture.session(fixture.project(true, vec![Abi::Arm64V8a]));

    CompileNativeTask.execute(&session).expect("direct compile");

    let objects = session.intermediate("native/obj/arm64-v8a");
    assert!(objects.join("a/b.c.o").is_file());
    assert!(objects.join("a_b.c.o").is_file());
    assert_eq!(files_with_extension(&objects, "o").len(), 2);
}
