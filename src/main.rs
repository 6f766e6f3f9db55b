fn main() -> std::process::ExitCode {
  library_desk::run()
}
