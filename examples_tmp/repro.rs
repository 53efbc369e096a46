fn main() {
    let result = mprompt::prompt(|_p, arg| arg, Box::new(42i32) as mprompt::BoxAny);
    println!("{:?}", result.downcast::<i32>().unwrap());
}
