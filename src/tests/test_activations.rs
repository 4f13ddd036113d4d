use ndarray::array;

use crate::activations::{Activation, OutputKind, DEFAULT_LEAKY_ALPHA};

#[test]
fn test_sigmoid_activation() {
    let act = Activation::Sigmoid;
    assert_eq!(act.apply(0.0), 0.5);
    assert!(act.apply(10.0) > 0.99);
    assert!(act.apply(-10.0) < 0.01);
}

#[test]
fn test_tanh_activation() {
    let act = Activation::Tanh;
    assert_eq!(act.apply(0.0), 0.0);
    assert!((act.apply(1.0) - 1.0f64.tanh()).abs() < 1e-15);
}

#[test]
fn test_relu_activation() {
    let act = Activation::Relu;
    assert_eq!(act.apply(-2.0), 0.0);
    assert_eq!(act.apply(3.0), 3.0);
}

#[test]
fn test_leaky_relu_activation() {
    let act = Activation::LeakyRelu { alpha: 0.1 };
    assert_eq!(act.apply(2.0), 2.0);
    assert!((act.apply(-2.0) + 0.2).abs() < 1e-15);
}

#[test]
fn test_linear_activation() {
    let act = Activation::Linear;
    assert_eq!(act.apply(-1.5), -1.5);
    assert_eq!(act.derivative(-1.5), 1.0);
}

#[test]
fn test_derivatives_take_activated_output() {
    // derivatives are written in terms of the activation's own output
    let x = 0.7;

    let v = Activation::Tanh.apply(x);
    assert!((Activation::Tanh.derivative(v) - (1.0 - x.tanh().powi(2))).abs() < 1e-15);

    let s = Activation::Sigmoid.apply(x);
    assert!((Activation::Sigmoid.derivative(s) - s * (1.0 - s)).abs() < 1e-15);

    assert_eq!(Activation::Relu.derivative(2.0), 1.0);
    assert_eq!(Activation::Relu.derivative(0.0), 0.0);

    let leaky = Activation::LeakyRelu { alpha: 0.25 };
    assert_eq!(leaky.derivative(1.0), 1.0);
    assert_eq!(leaky.derivative(-1.0), 0.25);
}

#[test]
fn test_apply_inplace_and_derivative_of_output() {
    let act = Activation::Relu;
    let mut values = array![1.0, -0.5, 0.0, 2.0];
    act.apply_inplace(&mut values);
    assert_eq!(values, array![1.0, 0.0, 0.0, 2.0]);

    let derivs = act.derivative_of_output(&values);
    assert_eq!(derivs, array![1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_wire_codes_round_trip() {
    let variants = [
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Relu,
        Activation::LeakyRelu {
            alpha: DEFAULT_LEAKY_ALPHA,
        },
        Activation::Linear,
    ];
    for act in variants {
        assert_eq!(Activation::from_code(act.code()), act);
    }
    // unknown codes fall back to the format's zero value
    assert_eq!(Activation::from_code(99), Activation::Sigmoid);
    assert_eq!(Activation::from_code(-1), Activation::Sigmoid);
}

#[test]
fn test_output_kinds() {
    assert_eq!(OutputKind::Linear.apply(3.25), 3.25);
    assert_eq!(OutputKind::Linear.derivative(3.25), 1.0);

    let v = OutputKind::Sigmoid.apply(0.3);
    assert!(v > 0.0 && v < 1.0);
    assert!((OutputKind::Sigmoid.derivative(v) - v * (1.0 - v)).abs() < 1e-15);
}
